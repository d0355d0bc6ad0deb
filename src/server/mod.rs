//! HTTP and WebSocket Surface
//!
//! Thin axum routing around the engine:
//!
//! - `POST /v1/chat/completions` (and `/v1/completions`): the mocked API
//! - `/api/preset-queue/...`: staged response administration
//! - `/api/pending/...`: operator view and manual answers
//! - `/api/bypass/...`: upstream forwarding settings
//! - `GET /ws`: real-time observer channel
//! - `GET /health`, `GET /`: status

pub mod bypass;
pub mod completions;
pub mod error;
pub mod pending;
pub mod queues;
pub mod status;
pub mod websocket;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::net::TcpListener;

use crate::bypass::BypassForwarder;
use crate::engine::Engine;

pub use error::ApiError;

/// Default ceiling for import payloads
pub const DEFAULT_MAX_IMPORT_BYTES: usize = 10 * 1024 * 1024;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub bypass: Arc<BypassForwarder>,
    pub max_import_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Engine, bypass: Arc<BypassForwarder>, max_import_bytes: usize) -> Self {
        Self {
            engine,
            bypass,
            max_import_bytes,
            started_at: Utc::now(),
        }
    }
}

/// Build the complete router
pub fn build_router(state: AppState) -> Router {
    // Imports slightly over the limit must still reach the handler's size check
    let import_body_limit = state.max_import_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/", get(status::root))
        .route("/health", get(status::health))
        .route("/v1/chat/completions", post(completions::create_completion))
        .route("/v1/completions", post(completions::create_completion))
        .route(
            "/api/preset-queue",
            get(queues::list_all).delete(queues::clear_all),
        )
        .route("/api/preset-queue/export", get(queues::export_all))
        .route(
            "/api/preset-queue/{key}",
            get(queues::get_queue)
                .post(queues::enqueue_one)
                .delete(queues::clear_queue),
        )
        .route("/api/preset-queue/{key}/batch", post(queues::enqueue_batch))
        .route(
            "/api/preset-queue/{key}/import",
            post(queues::import_queue).layer(DefaultBodyLimit::max(import_body_limit)),
        )
        .route("/api/preset-queue/{key}/export", get(queues::export_queue))
        .route(
            "/api/preset-queue/{key}/{response_id}",
            axum::routing::delete(queues::delete_response),
        )
        .route("/api/pending", get(pending::list_pending))
        .route("/api/pending/{id}/response", post(pending::submit_response))
        .route(
            "/api/bypass/config",
            get(bypass::get_config).put(bypass::update_config),
        )
        .route("/api/bypass/enable", post(bypass::enable))
        .route("/api/bypass/disable", post(bypass::disable))
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

/// Parse a request body as JSON, reporting the position of syntax errors
pub(crate) fn parse_json_body(body: &Bytes) -> Result<Value, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        ApiError::Validation(format!(
            "invalid JSON body at line {} column {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })
}
