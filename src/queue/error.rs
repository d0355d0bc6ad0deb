//! Queue Error Types
//!
//! Defines error types for the staged response store, its backing stores and
//! the import/export adapter.

use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur during queue operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    /// A staged response or import payload was rejected before any mutation
    #[error("Validation failed: {message}")]
    Validation { message: String },

    /// The referenced queue or queue entry does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The durable write backing a mutation did not complete
    #[error("Persistence failure: {message}")]
    PersistenceFailure { message: String },
}

impl QueueError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a persistence failure error
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            message: message.into(),
        }
    }

    /// True when the error was caused by caller input rather than the system
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::NotFound { .. })
    }
}
