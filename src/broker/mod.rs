//! Response Resolution
//!
//! The broker owns the in-flight request set. Each inbound request is
//! answered from its client's staged queue when one is waiting; otherwise it
//! becomes a pending request that an operator can answer by id before the
//! resolution timeout expires.
//!
//! ```text
//!            pop_front hit
//! request ───────────────────────────────▶ Resolution (automatic)
//!    │
//!    │ miss
//!    ▼
//! Pending ──submit_manual──▶ Resolved ───▶ Resolution (manual)
//!    │
//!    ├──deadline──────────▶ TimedOut ───▶ ResolutionTimeout
//!    └──caller gone/shutdown▶ Abandoned
//! ```

pub mod error;
pub mod pending;
pub mod resolution;

pub use error::{BrokerError, BrokerResult};
pub use pending::{PendingRequest, PendingState, RequestId, Resolution, ResolutionSource};
pub use resolution::{
    BrokerConfig, ResolutionBroker, DEFAULT_FINISHED_HISTORY, DEFAULT_RESOLUTION_TIMEOUT,
};
