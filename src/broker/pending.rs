//! In-flight Request Types
//!
//! Identifiers, states and records for requests the broker is answering.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::queue::ClientKey;

/// Identifier of one inbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for RequestId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Lifecycle of a waiting request
///
/// `Pending` is the only non-terminal state and exactly one transition
/// ever leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    Pending,
    Resolved,
    TimedOut,
    Abandoned,
}

impl PendingState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PendingState::Pending)
    }
}

impl fmt::Display for PendingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PendingState::Pending => "pending",
            PendingState::Resolved => "resolved",
            PendingState::TimedOut => "timed_out",
            PendingState::Abandoned => "abandoned",
        };
        f.write_str(name)
    }
}

/// A request waiting for an operator response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    pub id: RequestId,
    pub client_key: ClientKey,
    pub received_at: DateTime<Utc>,
    pub body: Value,
    pub state: PendingState,
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// Drawn from the client's staged response queue
    Automatic,
    /// Submitted by an operator
    Manual,
}

/// The response delivered to a request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub id: RequestId,
    pub body: Value,
    pub status_code: u16,
    pub source: ResolutionSource,
}

/// Bounded memory of requests that recently left the in-flight set
///
/// Lets late submissions be told `AlreadyResolved` rather than `NotFound`.
#[derive(Debug)]
pub(crate) struct FinishedLog {
    order: VecDeque<RequestId>,
    states: HashMap<RequestId, PendingState>,
    capacity: usize,
}

impl FinishedLog {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(4096)),
            states: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn record(&mut self, id: RequestId, state: PendingState) {
        if self.states.insert(id, state).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    pub(crate) fn get(&self, id: &RequestId) -> Option<PendingState> {
        self.states.get(id).copied()
    }
}
