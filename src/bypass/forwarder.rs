//! Upstream Forwarding
//!
//! Sends a completion request to the configured upstream and relays its
//! answer. Observers see a `bypass_request` event before the call and a
//! `bypass_response` event after it, whether it succeeded or not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::broker::RequestId;
use crate::bypass::config::{BypassConfig, BypassSettings};
use crate::bypass::error::{BypassError, BypassResult};
use crate::notifications::{HubEvent, Publisher};
use crate::queue::ClientKey;

/// Headers that describe the inbound connection rather than the request
pub const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
    // The client has no decompression support, so upstream bodies must arrive as identity
    "accept-encoding",
];

/// Status reported when forwarding itself fails
pub const BAD_GATEWAY: u16 = 502;

/// The upstream's answer
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardedResponse {
    pub status_code: u16,
    pub body: Value,
    pub elapsed: Duration,
}

/// Client side of bypass mode
pub struct BypassForwarder {
    client: reqwest::Client,
    settings: Arc<BypassSettings>,
    publisher: Arc<dyn Publisher<HubEvent>>,
}

impl BypassForwarder {
    pub fn new(settings: Arc<BypassSettings>, publisher: Arc<dyn Publisher<HubEvent>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            publisher,
        }
    }

    pub fn settings(&self) -> &Arc<BypassSettings> {
        &self.settings
    }

    /// Forward `body` upstream on behalf of `client_key`
    ///
    /// `headers` are the inbound request headers as name/value strings.
    pub async fn forward(
        &self,
        client_key: &ClientKey,
        body: &Value,
        headers: &[(String, String)],
    ) -> BypassResult<ForwardedResponse> {
        let config = self.settings.current().await;
        let id = RequestId::new();
        let target_url = config.target_url();

        info!("Forwarding request {} from {} to {}", id, client_key, target_url);
        self.publisher.publish(HubEvent::BypassRequest {
            id,
            client_key: client_key.clone(),
            target_url: target_url.clone(),
            body: body.clone(),
        });

        let started = Instant::now();
        let result = self.send(&config, &target_url, body, headers).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(response) => {
                info!(
                    "Received upstream response for {}: status={}, elapsed={:.3}s",
                    id,
                    response.status_code,
                    elapsed.as_secs_f64()
                );
                self.publisher.publish(HubEvent::BypassResponse {
                    id,
                    client_key: client_key.clone(),
                    status_code: response.status_code,
                    response: response.body.clone(),
                    duration_ms: elapsed.as_millis() as u64,
                    error: None,
                });
            }
            Err(e) => {
                error!("Forwarding request {} failed: {}", id, e);
                self.publisher.publish(HubEvent::BypassResponse {
                    id,
                    client_key: client_key.clone(),
                    status_code: BAD_GATEWAY,
                    response: json!({ "error": e.to_string() }),
                    duration_ms: elapsed.as_millis() as u64,
                    error: Some(e.to_string()),
                });
            }
        }
        result
    }

    async fn send(
        &self,
        config: &BypassConfig,
        target_url: &str,
        body: &Value,
        headers: &[(String, String)],
    ) -> BypassResult<ForwardedResponse> {
        let started = Instant::now();
        let payload = serde_json::to_vec(body)
            .map_err(|e| BypassError::Upstream { message: e.to_string() })?;

        let response = self
            .client
            .post(target_url)
            .headers(prepare_headers(headers, config))
            .timeout(Duration::from_secs(config.timeout_secs))
            .body(payload)
            .send()
            .await
            .map_err(|e| classify(e, config, target_url))?;

        let status_code = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify(e, config, target_url))?;

        Ok(ForwardedResponse {
            status_code,
            body: upstream_body(&bytes, status_code),
            elapsed: started.elapsed(),
        })
    }
}

/// Filter inbound headers and add the upstream's authorization and content type
pub fn prepare_headers(original: &[(String, String)], config: &BypassConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in original {
        if HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }

    if let Some(key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
            headers.insert(AUTHORIZATION, value);
        }
    }
    if !headers.contains_key(CONTENT_TYPE) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    headers
}

/// Upstream body as JSON, wrapping anything else in an API error document
pub fn upstream_body(bytes: &[u8], status_code: u16) -> Value {
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        json!({
            "error": {
                "message": String::from_utf8_lossy(bytes),
                "type": "api_error",
                "code": status_code,
            }
        })
    })
}

fn classify(e: reqwest::Error, config: &BypassConfig, target_url: &str) -> BypassError {
    if e.is_timeout() {
        BypassError::Timeout {
            secs: config.timeout_secs,
        }
    } else if e.is_connect() {
        BypassError::Connect {
            url: target_url.to_string(),
            message: e.to_string(),
        }
    } else {
        BypassError::Upstream {
            message: e.to_string(),
        }
    }
}
