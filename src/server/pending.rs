//! Operator endpoints for requests waiting on a manual answer

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::broker::RequestId;
use crate::queue::DEFAULT_STATUS_CODE;
use crate::server::{parse_json_body, ApiError, AppState};

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

#[derive(Debug, Deserialize)]
pub struct ManualResponse {
    pub response: Value,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

/// `GET /api/pending`
pub async fn list_pending(State(state): State<AppState>) -> Json<Value> {
    let pending = state.engine.broker().list_pending();
    Json(json!({
        "count": pending.len(),
        "pending": pending,
    }))
}

/// `POST /api/pending/{id}/response`
pub async fn submit_response(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let id: RequestId = id
        .parse()
        .map_err(|_| ApiError::Validation(format!("invalid request id '{}'", id)))?;
    let manual: ManualResponse = serde_json::from_value(parse_json_body(&body)?)
        .map_err(|e| ApiError::Validation(format!("invalid request: {}", e)))?;

    let settled = state
        .engine
        .broker()
        .submit_manual(id, manual.response, manual.status_code)?;

    Ok(Json(json!({
        "success": true,
        "id": settled.id,
        "client_key": settled.client_key,
        "state": "resolved",
    })))
}
