//! Notification Event Types
//!
//! Defines the events that flow from the engine to connected observers.
//! On the wire every event is an object of the form
//! `{"type": "<kind>", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::{RequestId, ResolutionSource};
use crate::queue::ClientKey;

/// Base trait for all notification events
pub trait NotificationEvent: Send + Sync + Clone + std::fmt::Debug + 'static {
    /// Short event kind name, used for logging and filtering
    fn event_type(&self) -> &'static str;

    /// Client partition the event concerns, if any
    fn client_key(&self) -> Option<&ClientKey> {
        None
    }
}

/// Engine state changes broadcast to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    /// A request found no staged response and is waiting for an operator
    NewRequest {
        id: RequestId,
        client_key: ClientKey,
        body: Value,
        received_at: DateTime<Utc>,
    },

    /// A request was answered, from a queue or by an operator
    CompletedRequest {
        id: RequestId,
        client_key: ClientKey,
        body: Value,
        response: Value,
        status_code: u16,
        source: ResolutionSource,
    },

    /// One client's queue changed
    QueueUpdated {
        client_key: ClientKey,
        queue_length: usize,
    },

    /// Every queue changed at once
    AllQueuesUpdated {},

    /// A waiting request left the in-flight set without a response
    RequestExpired {
        id: RequestId,
        client_key: ClientKey,
        reason: ExpiryReason,
    },

    /// A request is being forwarded upstream
    BypassRequest {
        id: RequestId,
        client_key: ClientKey,
        target_url: String,
        body: Value,
    },

    /// The upstream answered, or forwarding failed
    BypassResponse {
        id: RequestId,
        client_key: ClientKey,
        status_code: u16,
        response: Value,
        duration_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Forwarding settings changed
    BypassConfigUpdated { config: Value },
}

/// Why a pending request expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    Timeout,
    Abandoned,
}

impl NotificationEvent for HubEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HubEvent::NewRequest { .. } => "new_request",
            HubEvent::CompletedRequest { .. } => "completed_request",
            HubEvent::QueueUpdated { .. } => "queue_updated",
            HubEvent::AllQueuesUpdated {} => "all_queues_updated",
            HubEvent::RequestExpired { .. } => "request_expired",
            HubEvent::BypassRequest { .. } => "bypass_request",
            HubEvent::BypassResponse { .. } => "bypass_response",
            HubEvent::BypassConfigUpdated { .. } => "bypass_config_updated",
        }
    }

    fn client_key(&self) -> Option<&ClientKey> {
        match self {
            HubEvent::NewRequest { client_key, .. }
            | HubEvent::CompletedRequest { client_key, .. }
            | HubEvent::QueueUpdated { client_key, .. }
            | HubEvent::RequestExpired { client_key, .. }
            | HubEvent::BypassRequest { client_key, .. }
            | HubEvent::BypassResponse { client_key, .. } => Some(client_key),
            HubEvent::AllQueuesUpdated {} | HubEvent::BypassConfigUpdated { .. } => None,
        }
    }
}

impl HubEvent {
    /// Create a queue updated event
    pub fn queue_updated(client_key: ClientKey, queue_length: usize) -> Self {
        Self::QueueUpdated {
            client_key,
            queue_length,
        }
    }

    /// Create an all queues updated event
    pub fn all_queues_updated() -> Self {
        Self::AllQueuesUpdated {}
    }
}
