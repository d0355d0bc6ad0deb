//! Resolution Broker Error Types

use std::time::Duration;

use thiserror::Error;

use crate::broker::pending::RequestId;
use crate::queue::QueueError;

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;

/// Errors from resolving requests and submitting manual responses
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BrokerError {
    /// No response arrived before the deadline
    #[error("No response for request {id} within {waited:?}")]
    ResolutionTimeout { id: RequestId, waited: Duration },

    /// The id names no request the broker knows about
    #[error("Pending request {id} not found")]
    NotFound { id: RequestId },

    /// Another submission or the timeout already settled the request
    #[error("Pending request {id} is already resolved")]
    AlreadyResolved { id: RequestId },

    /// The request was dropped before any response arrived
    #[error("Request {id} was abandoned before a response arrived")]
    Abandoned { id: RequestId },

    /// New requests are refused during shutdown
    #[error("Resolution broker is shutting down")]
    ShuttingDown,

    /// Queue access or response validation failed
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl BrokerError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ResolutionTimeout { .. })
    }
}
