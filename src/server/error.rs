//! HTTP Error Mapping
//!
//! Every failure leaves the server as `{"error": {"code": ..., "message": ...}}`
//! with a status that tells callers what kind of failure it was.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::warn;
use serde_json::json;

use crate::broker::BrokerError;
use crate::bypass::BypassError;
use crate::queue::QueueError;

/// Error code sent when a request waited past its deadline
pub const RESOLUTION_TIMEOUT_CODE: &str = "RESOLUTION_TIMEOUT";

/// Errors returned by HTTP handlers
#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Malformed input, rejected before any state changed
    Validation(String),
    /// The request body is over the configured ceiling
    PayloadTooLarge(String),
    /// The addressed queue, entry or request does not exist
    NotFound(String),
    /// The request was already settled
    AlreadyResolved(String),
    /// No response arrived in time
    Timeout(String),
    /// The durable write failed; state is unchanged
    Persistence(String),
    /// Forwarding to the upstream failed
    Upstream(String),
    /// The server is shutting down or dropped the request
    Unavailable(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::AlreadyResolved(msg) => (StatusCode::CONFLICT, "ALREADY_RESOLVED", msg),
            Self::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, RESOLUTION_TIMEOUT_CODE, msg),
            Self::Persistence(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_FAILURE", msg)
            }
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            warn!("{} {}: {}", status.as_u16(), code, message);
        }
        let body = json!({
            "error": {
                "code": code,
                "message": message,
            }
        });
        (status, Json(body)).into_response()
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Validation { .. } => Self::Validation(e.to_string()),
            QueueError::NotFound { .. } => Self::NotFound(e.to_string()),
            QueueError::PersistenceFailure { .. } => Self::Persistence(e.to_string()),
        }
    }
}

impl From<BrokerError> for ApiError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::ResolutionTimeout { .. } => Self::Timeout(e.to_string()),
            BrokerError::NotFound { .. } => Self::NotFound(e.to_string()),
            BrokerError::AlreadyResolved { .. } => Self::AlreadyResolved(e.to_string()),
            BrokerError::Abandoned { .. } | BrokerError::ShuttingDown => {
                Self::Unavailable(e.to_string())
            }
            BrokerError::Queue(inner) => inner.into(),
        }
    }
}

impl From<BypassError> for ApiError {
    fn from(e: BypassError) -> Self {
        match e {
            BypassError::Validation { .. } => Self::Validation(e.to_string()),
            BypassError::Persistence { .. } => Self::Persistence(e.to_string()),
            BypassError::Timeout { .. } | BypassError::Connect { .. } | BypassError::Upstream { .. } => {
                Self::Upstream(e.to_string())
            }
        }
    }
}
