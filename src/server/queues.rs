//! Staged Response Administration
//!
//! Handlers under `/api/preset-queue`. Queue keys in paths are client
//! addresses exactly as the completion endpoint derives them.

use axum::body::Bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::queue::transfer::{self, ImportMode};
use crate::queue::{ClientKey, StagedResponse, DEFAULT_STATUS_CODE};
use crate::server::{parse_json_body, ApiError, AppState};

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub response: Value,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub responses: Vec<Value>,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

#[derive(Debug, Deserialize)]
pub struct ImportParams {
    pub status_code: Option<u16>,
    pub mode: Option<String>,
}

fn parse_request<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let value = parse_json_body(body)?;
    serde_json::from_value(value).map_err(|e| ApiError::Validation(format!("invalid request: {}", e)))
}

/// `GET /api/preset-queue`
pub async fn list_all(State(state): State<AppState>) -> Json<Value> {
    let table = state.engine.store().snapshot_all().await;
    let total_responses: usize = table.values().map(Vec::len).sum();
    let queues: serde_json::Map<String, Value> = table
        .iter()
        .map(|(key, items)| {
            (
                key.to_string(),
                json!({ "count": items.len(), "items": items }),
            )
        })
        .collect();

    Json(json!({
        "queues": queues,
        "total_clients": table.len(),
        "total_responses": total_responses,
    }))
}

/// `GET /api/preset-queue/{key}`
pub async fn get_queue(State(state): State<AppState>, Path(key): Path<String>) -> Json<Value> {
    let key = ClientKey::from(key);
    let items = state.engine.store().snapshot(&key).await;
    Json(json!({
        "client_key": key,
        "count": items.len(),
        "items": items,
    }))
}

/// `POST /api/preset-queue/{key}`
pub async fn enqueue_one(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let key = ClientKey::from(key);
    let request: EnqueueRequest = parse_request(&body)?;
    let entry = StagedResponse::new(request.response, request.status_code)?;
    let response_id = entry.id;

    let queue_length = state.engine.store().append_entries(&key, vec![entry]).await?;
    Ok(Json(json!({
        "success": true,
        "response_id": response_id,
        "queue_length": queue_length,
    })))
}

/// `POST /api/preset-queue/{key}/batch`
pub async fn enqueue_batch(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let key = ClientKey::from(key);
    let request: BatchRequest = parse_request(&body)?;
    let added = request.responses.len();

    let queue_length = state
        .engine
        .store()
        .enqueue_batch(&key, request.responses, request.status_code)
        .await?;
    Ok(Json(json!({
        "success": true,
        "added_count": added,
        "queue_length": queue_length,
    })))
}

/// `POST /api/preset-queue/{key}/import`
///
/// The body is the raw file content, or a `multipart/form-data` upload whose
/// `file` field holds it.
pub async fn import_queue(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<ImportParams>,
    request: Request,
) -> Result<Json<Value>, ApiError> {
    let key = ClientKey::from(key);
    let mode = match params.mode.as_deref() {
        Some(mode) => mode.parse::<ImportMode>()?,
        None => ImportMode::default(),
    };
    let status_code = params.status_code.unwrap_or(DEFAULT_STATUS_CODE);
    let body = import_payload(request, &state).await?;

    let summary = transfer::import(
        state.engine.store(),
        &key,
        &body,
        state.max_import_bytes,
        status_code,
        mode,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "client_key": summary.client_key,
        "mode": summary.mode,
        "imported": summary.imported,
        "queue_length": summary.queue_length,
    })))
}

/// Import file from a raw JSON body or the `file` field of a multipart upload
async fn import_payload(request: Request, state: &AppState) -> Result<Bytes, ApiError> {
    let is_multipart = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("multipart/form-data"));

    if !is_multipart {
        return Bytes::from_request(request, state)
            .await
            .map_err(|rejection| rejected(rejection.status(), rejection.body_text()));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|rejection| rejected(rejection.status(), rejection.body_text()))?;
    let mut first_file = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| rejected(e.status(), e.body_text()))?
    {
        let is_named_file = field.name() == Some("file");
        let is_file = is_named_file || field.file_name().is_some();
        if !is_file {
            continue;
        }
        let bytes = field.bytes().await.map_err(|e| rejected(e.status(), e.body_text()))?;
        if is_named_file {
            return Ok(bytes);
        }
        first_file.get_or_insert(bytes);
    }
    first_file.ok_or_else(|| ApiError::Validation("multipart upload has no file field".to_string()))
}

fn rejected(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(message)
    } else {
        ApiError::Validation(message)
    }
}

/// `GET /api/preset-queue/{key}/export`
pub async fn export_queue(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let key = ClientKey::from(key);
    let document = transfer::export(state.engine.store(), &key).await?;
    let file_name = transfer::export_file_name(&key, document.exported_at);
    download(&document, &file_name)
}

/// `GET /api/preset-queue/export`
pub async fn export_all(State(state): State<AppState>) -> Result<Response, ApiError> {
    let document = transfer::export_all(state.engine.store()).await;
    if document.queues.values().all(Vec::is_empty) {
        return Err(ApiError::NotFound("no staged responses to export".to_string()));
    }
    let file_name = format!("queue_all_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
    download(&document, &file_name)
}

fn download<T: serde::Serialize>(document: &T, file_name: &str) -> Result<Response, ApiError> {
    let content = serde_json::to_string_pretty(document)
        .map_err(|e| ApiError::Persistence(format!("cannot render export: {}", e)))?;
    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename={}", file_name)),
        ],
        content,
    )
        .into_response())
}

/// `DELETE /api/preset-queue/{key}/{response_id}`
pub async fn delete_response(
    State(state): State<AppState>,
    Path((key, response_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let key = ClientKey::from(key);
    let not_found = || ApiError::NotFound(format!("response {} not queued for {}", response_id, key));
    let id = Uuid::parse_str(&response_id).map_err(|_| not_found())?;

    if state.engine.store().remove(&key, id).await? {
        Ok(Json(json!({ "success": true })))
    } else {
        Err(not_found())
    }
}

/// `DELETE /api/preset-queue/{key}`
pub async fn clear_queue(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let removed = state.engine.store().clear(&ClientKey::from(key)).await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}

/// `DELETE /api/preset-queue`
pub async fn clear_all(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let removed = state.engine.store().clear_all().await?;
    Ok(Json(json!({ "success": true, "removed": removed })))
}
