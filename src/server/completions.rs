//! Completion Endpoint
//!
//! The mocked API itself. Forwarding takes priority when bypass mode is on;
//! otherwise the broker answers from the caller's staged queue or waits for
//! an operator.

use std::net::SocketAddr;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::debug;
use serde_json::Value;

use crate::queue::ClientKey;
use crate::server::{parse_json_body, ApiError, AppState};

/// `POST /v1/chat/completions`
pub async fn create_completion(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let client_key = ClientKey::from(peer);
    let request = parse_json_body(&body)?;
    debug!("Completion request from {}", client_key);

    if state.bypass.settings().is_enabled().await {
        let forwarded = state
            .bypass
            .forward(&client_key, &request, &header_pairs(&headers))
            .await?;
        return Ok(json_response(forwarded.status_code, forwarded.body));
    }

    let resolution = state.engine.broker().resolve(client_key, request).await?;
    Ok(json_response(resolution.status_code, resolution.body))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect()
}

fn json_response(status_code: u16, body: Value) -> Response {
    let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}
