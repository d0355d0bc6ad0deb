//! HTTP API integration tests
//!
//! Drive the full router in-process with `oneshot`, with the caller's address
//! supplied by `MockConnectInfo`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use mock_completion::bypass::{BypassConfig, BypassForwarder, BypassSettings};
use mock_completion::engine::{Engine, EngineConfig};
use mock_completion::notifications::{HubEvent, Publisher};
use mock_completion::server::{build_router, AppState, DEFAULT_MAX_IMPORT_BYTES};

const CALLER: &str = "10.0.0.7";

struct TestApp {
    router: Router,
    state: AppState,
}

async fn test_app_with(engine_config: EngineConfig, max_import_bytes: usize) -> TestApp {
    let engine = Engine::in_memory(&engine_config).await.unwrap();
    let publisher: Arc<dyn Publisher<HubEvent>> = engine.hub().clone();
    let settings = Arc::new(BypassSettings::in_memory(BypassConfig::default(), publisher.clone()));
    let forwarder = Arc::new(BypassForwarder::new(settings, publisher));
    let state = AppState::new(engine, forwarder, max_import_bytes);

    let router = build_router(state.clone())
        .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 50123))));
    TestApp { router, state }
}

async fn test_app() -> TestApp {
    test_app_with(EngineConfig::default(), DEFAULT_MAX_IMPORT_BYTES).await
}

impl TestApp {
    async fn raw(&self, method: &str, uri: &str, body: Body) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .unwrap();
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let body = match body {
            Some(value) => Body::from(value.to_string()),
            None => Body::empty(),
        };
        into_json(self.raw(method, uri, body).await).await
    }
}

async fn into_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn queue_uri(suffix: &str) -> String {
    format!("/api/preset-queue/{}{}", CALLER, suffix)
}

#[tokio::test]
async fn test_health_and_root() {
    let app = test_app().await;

    let (status, body) = app.call("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending_requests"], 0);
    assert_eq!(body["bypass_enabled"], false);

    let (status, body) = app.call("GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "mock-completion");
    assert_eq!(body["resolution_timeout_secs"], 300);
}

#[tokio::test]
async fn test_staged_response_is_served_once() {
    let app = test_app().await;

    let (status, body) = app
        .call("POST", &queue_uri(""), Some(json!({"response": {"id": "r1", "choices": []}, "status_code": 201})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["queue_length"], 1);
    assert!(body["response_id"].is_string());

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["client_key"], CALLER);
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["items"][0]["response"]["id"], "r1");

    let (status, body) = app
        .call("POST", "/v1/chat/completions", Some(json!({"messages": [{"role": "user", "content": "hi"}]})))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["id"], "r1");

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["count"], 0);
}

#[tokio::test]
async fn test_staged_sequence_then_timeout() {
    let config = EngineConfig {
        resolution_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let app = test_app_with(config, DEFAULT_MAX_IMPORT_BYTES).await;

    app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "r1"}}))).await;
    app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "r2"}, "status_code": 429}))).await;

    let (status, body) = app.call("POST", "/v1/chat/completions", Some(json!({"n": 1}))).await;
    assert_eq!((status, body["id"].clone()), (StatusCode::OK, json!("r1")));

    let (status, body) = app.call("POST", "/v1/completions", Some(json!({"n": 2}))).await;
    assert_eq!((status, body["id"].clone()), (StatusCode::TOO_MANY_REQUESTS, json!("r2")));

    let (status, body) = app.call("POST", "/v1/chat/completions", Some(json!({"n": 3}))).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["error"]["code"], "RESOLUTION_TIMEOUT");
    assert!(app.state.engine.broker().list_pending().is_empty());
}

#[tokio::test]
async fn test_completion_rejects_malformed_json() {
    let app = test_app().await;
    let response = app.raw("POST", "/v1/chat/completions", Body::from("{not json")).await;
    let (status, body) = into_json(response).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_batch_validation_is_all_or_nothing() {
    let app = test_app().await;

    let (status, body) = app
        .call("POST", &queue_uri("/batch"), Some(json!({"responses": [{"a": 1}, {"b": 2}]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added_count"], 2);
    assert_eq!(body["queue_length"], 2);

    let (status, _) = app
        .call("POST", &queue_uri("/batch"), Some(json!({"responses": [{"c": 3}, "not an object"]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.call("POST", &queue_uri("/batch"), Some(json!({"responses": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .call("POST", &queue_uri(""), Some(json!({"response": {"x": 1}, "status_code": 99})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["count"], 2);
}

#[tokio::test]
async fn test_export_clear_import_round_trip() {
    let app = test_app().await;
    app.call(
        "POST",
        &queue_uri("/batch"),
        Some(json!({"responses": [{"id": "a"}, {"id": "b"}]})),
    )
    .await;
    app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "c"}, "status_code": 500}))).await;

    let (_, before) = app.call("GET", &queue_uri(""), None).await;

    let response = app.raw("GET", &queue_uri("/export"), Body::empty()).await;
    let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert!(disposition.starts_with("attachment; filename=queue_10.0.0.7_"));
    let (status, exported) = into_json(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exported["entries"].as_array().unwrap().len(), 3);

    let (status, cleared) = app.call("DELETE", &queue_uri(""), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleared["removed"], 3);

    let (status, summary) = app.call("POST", &queue_uri("/import"), Some(exported)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["imported"], 3);
    assert_eq!(summary["mode"], "replace");

    let (_, after) = app.call("GET", &queue_uri(""), None).await;
    let strip = |queue: &Value| -> Vec<(Value, Value)> {
        queue["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|item| (item["response"].clone(), item["status_code"].clone()))
            .collect()
    };
    assert_eq!(strip(&before), strip(&after));
}

#[tokio::test]
async fn test_import_modes_and_rejections() {
    let app = test_app_with(EngineConfig::default(), 256).await;
    app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "kept"}}))).await;

    let (status, summary) = app
        .call("POST", &queue_uri("/import?mode=append&status_code=202"), Some(json!([{"id": "x"}, {"id": "y"}])))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["queue_length"], 3);

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["items"][0]["response"]["id"], "kept");
    assert_eq!(queue["items"][2]["status_code"], 202);

    let rejected = [
        Body::from("[{\"id\": 1},"),
        Body::from("{\"entries\": 5}"),
        Body::from(format!("[{{\"pad\": \"{}\"}}]", "x".repeat(400))),
    ];
    for body in rejected {
        let (status, body) = into_json(app.raw("POST", &queue_uri("/import"), body).await).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);
    }

    let (status, _) = app.call("POST", &queue_uri("/import?mode=merge"), Some(json!([]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["count"], 3);
}

#[tokio::test]
async fn test_delete_and_clear_errors() {
    let app = test_app().await;
    let (_, added) = app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "gone"}}))).await;
    let response_id = added["response_id"].as_str().unwrap().to_string();

    let (status, _) = app.call("DELETE", &queue_uri("/not-a-uuid"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("DELETE", &queue_uri(&format!("/{}", response_id)), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.call("DELETE", &queue_uri(&format!("/{}", response_id)), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("DELETE", "/api/preset-queue/192.168.9.9", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("GET", &queue_uri("/export"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("GET", "/api/preset-queue/export", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_and_clear_all() {
    let app = test_app().await;
    app.call("POST", &queue_uri("/batch"), Some(json!({"responses": [{"a": 1}, {"a": 2}]}))).await;
    app.call("POST", "/api/preset-queue/10.0.0.8", Some(json!({"response": {"b": 1}}))).await;

    let (_, all) = app.call("GET", "/api/preset-queue", None).await;
    assert_eq!(all["total_clients"], 2);
    assert_eq!(all["total_responses"], 3);
    assert_eq!(all["queues"]["10.0.0.8"]["count"], 1);

    let response = app.raw("GET", "/api/preset-queue/export", Body::empty()).await;
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("queue_all_"));
    let (_, exported) = into_json(response).await;
    assert_eq!(exported["queues"][CALLER].as_array().unwrap().len(), 2);

    let (status, body) = app.call("DELETE", "/api/preset-queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 3);

    let (_, all) = app.call("GET", "/api/preset-queue", None).await;
    assert_eq!(all["total_responses"], 0);
}

#[tokio::test]
async fn test_manual_response_through_pending_api() {
    let app = test_app().await;

    let router = app.router.clone();
    let caller = tokio::spawn(async move {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({"prompt": "wait for me"}).to_string()))
            .unwrap();
        into_json(router.oneshot(request).await.unwrap()).await
    });

    let pending_id = loop {
        let (_, pending) = app.call("GET", "/api/pending", None).await;
        if pending["count"] == 1 {
            assert_eq!(pending["pending"][0]["client_key"], CALLER);
            assert_eq!(pending["pending"][0]["body"]["prompt"], "wait for me");
            break pending["pending"][0]["id"].as_str().unwrap().to_string();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };

    let uri = format!("/api/pending/{}/response", pending_id);
    let (status, body) = app
        .call("POST", &uri, Some(json!({"response": {"answer": "manual"}, "status_code": 202})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, body) = caller.await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["answer"], "manual");

    let (status, body) = app.call("POST", &uri, Some(json!({"response": {"again": true}}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_RESOLVED");

    let unknown = format!("/api/pending/{}/response", uuid::Uuid::new_v4());
    let (status, _) = app.call("POST", &unknown, Some(json!({"response": {}}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call("POST", "/api/pending/xyz/response", Some(json!({"response": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_bypass_settings_endpoints() {
    let app = test_app().await;

    let (status, config) = app.call("GET", "/api/bypass/config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["enabled"], false);
    assert_eq!(config["target_host"], "api.openai.com");
    assert_eq!(config["api_key_configured"], false);

    let (status, config) = app
        .call("PUT", "/api/bypass/config", Some(json!({"api_key": "sk-secret", "timeout": 30})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(config["api_key_configured"], true);
    assert_eq!(config["timeout"], 30);
    assert!(!config.to_string().contains("sk-secret"));

    let (status, _) = app.call("PUT", "/api/bypass/config", Some(json!({"target_port": 70000}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = app.call("PUT", "/api/bypass/config", Some(json!({"target_uri": "v1"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, config) = app.call("POST", "/api/bypass/enable", None).await;
    assert_eq!(config["enabled"], true);
    let (_, health) = app.call("GET", "/health", None).await;
    assert_eq!(health["bypass_enabled"], true);

    let (_, config) = app.call("POST", "/api/bypass/disable", None).await;
    assert_eq!(config["enabled"], false);
}

#[tokio::test]
async fn test_bypass_forwards_ahead_of_staged_queue() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(|Json(body): Json<Value>| async move {
            (StatusCode::CREATED, Json(json!({"upstream": true, "echo": body})))
        }),
    );
    tokio::spawn(async move { axum::serve(listener, upstream).await });

    let app = test_app().await;
    app.call("POST", &queue_uri(""), Some(json!({"response": {"id": "staged"}}))).await;
    app.call(
        "PUT",
        "/api/bypass/config",
        Some(json!({"target_host": "127.0.0.1", "target_port": port, "use_https": false})),
    )
    .await;
    app.call("POST", "/api/bypass/enable", None).await;

    let (status, body) = app.call("POST", "/v1/chat/completions", Some(json!({"model": "m"}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["upstream"], true);
    assert_eq!(body["echo"]["model"], "m");

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["count"], 1);
}

#[tokio::test]
async fn test_bypass_relays_json_to_clients_offering_gzip() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let upstream = Router::new().route(
        "/v1/chat/completions",
        post(|headers: axum::http::HeaderMap| async move {
            let offers_gzip = headers
                .get(header::ACCEPT_ENCODING)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|value| value.contains("gzip"));
            if offers_gzip {
                // Gzip member header; a client that cannot inflate sees binary
                let compressed: &'static [u8] = &[0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03];
                Response::builder()
                    .header(header::CONTENT_ENCODING, "gzip")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(compressed))
                    .unwrap()
            } else {
                Json(json!({"id": "chatcmpl-1", "object": "chat.completion"})).into_response()
            }
        }),
    );
    tokio::spawn(async move { axum::serve(listener, upstream).await });

    let app = test_app().await;
    app.call(
        "PUT",
        "/api/bypass/config",
        Some(json!({"target_host": "127.0.0.1", "target_port": port, "use_https": false})),
    )
    .await;
    app.call("POST", "/api/bypass/enable", None).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCEPT_ENCODING, "gzip, deflate")
        .body(Body::from(json!({"model": "m"}).to_string()))
        .unwrap();
    let (status, body) = into_json(app.router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "chatcmpl-1");
}

fn multipart_request(uri: &str, field_name: &str, file_name: &str, content: &str) -> Request<Body> {
    let boundary = "mock-completion-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nignored\r\n\
         --{b}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file}\"\r\n\
         Content-Type: application/json\r\n\r\n{content}\r\n--{b}--\r\n",
        b = boundary,
        field = field_name,
        file = file_name,
        content = content,
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_import_accepts_multipart_file_upload() {
    let app = test_app().await;

    let request = multipart_request(
        &queue_uri("/import?status_code=201"),
        "file",
        "queue.json",
        r#"[{"id": "from-upload-1"}, {"id": "from-upload-2"}]"#,
    );
    let (status, summary) = into_json(app.router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["imported"], 2);

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["items"][0]["response"]["id"], "from-upload-1");
    assert_eq!(queue["items"][1]["status_code"], 201);

    // Any file field is accepted when none is named `file`
    let request = multipart_request(
        &queue_uri("/import?mode=append"),
        "upload",
        "more.json",
        r#"[{"id": "from-upload-3"}]"#,
    );
    let (status, summary) = into_json(app.router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::OK, "{}", summary);
    assert_eq!(summary["queue_length"], 3);

    let request = multipart_request(&queue_uri("/import"), "file", "broken.json", "[{\"id\": 1},");
    let (status, _) = into_json(app.router.clone().oneshot(request).await.unwrap()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, queue) = app.call("GET", &queue_uri(""), None).await;
    assert_eq!(queue["count"], 3);
}

#[tokio::test]
async fn test_import_far_over_limit_is_payload_too_large() {
    let app = test_app_with(EngineConfig::default(), 256).await;
    let huge = format!("[{{\"pad\": \"{}\"}}]", "x".repeat(128 * 1024));

    let (status, body) = into_json(app.raw("POST", &queue_uri("/import"), Body::from(huge)).await).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
}
