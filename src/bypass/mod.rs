//! Bypass Mode
//!
//! When enabled, completion requests skip the staged queues and operators
//! entirely and are forwarded to a real upstream API.

pub mod config;
pub mod error;
pub mod forwarder;

pub use config::{BypassConfig, BypassConfigView, BypassSettings, BypassUpdate};
pub use error::{BypassError, BypassResult};
pub use forwarder::{BypassForwarder, ForwardedResponse};
