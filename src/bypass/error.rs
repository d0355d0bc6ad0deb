//! Bypass Error Types

use thiserror::Error;

/// Result type for bypass operations
pub type BypassResult<T> = Result<T, BypassError>;

/// Errors from forwarding settings and upstream forwarding
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BypassError {
    /// A settings update or enable request was rejected
    #[error("Invalid bypass configuration: {message}")]
    Validation { message: String },

    /// Settings could not be written; the previous settings stay in effect
    #[error("Cannot save bypass configuration: {message}")]
    Persistence { message: String },

    /// The upstream did not answer within the configured timeout
    #[error("Request timeout after {secs}s")]
    Timeout { secs: u64 },

    /// No connection could be made to the upstream
    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    /// Any other transport failure
    #[error("HTTP error: {message}")]
    Upstream { message: String },
}

impl BypassError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// True for failures talking to the upstream, as opposed to local settings problems
    pub fn is_upstream(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connect { .. } | Self::Upstream { .. })
    }
}
