//! Bypass settings endpoints

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use crate::bypass::{BypassConfigView, BypassUpdate};
use crate::server::{parse_json_body, ApiError, AppState};

/// `GET /api/bypass/config`
pub async fn get_config(State(state): State<AppState>) -> Json<BypassConfigView> {
    Json(state.bypass.settings().view().await)
}

/// `PUT /api/bypass/config`
pub async fn update_config(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BypassConfigView>, ApiError> {
    let update: BypassUpdate = serde_json::from_value(parse_json_body(&body)?)
        .map_err(|e| ApiError::Validation(format!("invalid bypass settings: {}", e)))?;
    Ok(Json(state.bypass.settings().update(update).await?))
}

/// `POST /api/bypass/enable`
pub async fn enable(State(state): State<AppState>) -> Result<Json<BypassConfigView>, ApiError> {
    Ok(Json(state.bypass.settings().enable().await?))
}

/// `POST /api/bypass/disable`
pub async fn disable(State(state): State<AppState>) -> Result<Json<BypassConfigView>, ApiError> {
    Ok(Json(state.bypass.settings().disable().await?))
}
