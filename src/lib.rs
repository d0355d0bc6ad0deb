//! mock-completion
//!
//! A stand-in for a completion API. Callers get responses staged for them in
//! advance, answered live by an operator, or forwarded to a real upstream.

pub mod app;
pub mod broker;
pub mod bypass;
pub mod cli;
pub mod config;
pub mod engine;
pub mod logging;
pub mod notifications;
pub mod queue;
pub mod server;

// Defines STATE_FORMAT_VERSION from Cargo.toml metadata
include!(concat!(env!("OUT_DIR"), "/state_format.rs"));
