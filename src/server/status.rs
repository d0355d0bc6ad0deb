//! Health and service description

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::server::AppState;

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "pending_requests": state.engine.broker().list_pending().len(),
        "queued_clients": state.engine.store().keys().len(),
        "observers": state.engine.hub().subscriber_count(),
        "bypass_enabled": state.bypass.settings().is_enabled().await,
    }))
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let uptime = Utc::now().signed_duration_since(state.started_at);
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "state_format_version": crate::STATE_FORMAT_VERSION,
        "started_at": state.started_at,
        "uptime_secs": uptime.num_seconds(),
        "resolution_timeout_secs": state.engine.broker().resolution_timeout().as_secs(),
        "endpoints": {
            "completions": ["/v1/chat/completions", "/v1/completions"],
            "queues": "/api/preset-queue",
            "pending": "/api/pending",
            "bypass": "/api/bypass/config",
            "websocket": "/ws",
            "health": "/health",
        },
    }))
}
