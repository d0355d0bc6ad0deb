//! Staged Response Types
//!
//! Core data carried by the queue store: the client partition key and the
//! staged response records that sit in each client's FIFO queue.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::queue::error::{QueueError, QueueResult};

/// Status code applied when a caller does not supply one
pub const DEFAULT_STATUS_CODE: u16 = 200;

/// Partition identifier derived from a connection's originating address
///
/// Only the address is used; the source port changes between connections
/// and is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key rendered safe for use inside a file name
    pub fn file_safe(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '-' })
            .collect()
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<IpAddr> for ClientKey {
    fn from(addr: IpAddr) -> Self {
        // IPv4 peers reaching a dual-stack listener show up as mapped addresses
        let addr = match addr {
            IpAddr::V6(v6) => v6
                .to_ipv4_mapped()
                .map(IpAddr::V4)
                .unwrap_or(IpAddr::V6(v6)),
            v4 => v4,
        };
        Self(addr.to_string())
    }
}

impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self::from(addr.ip())
    }
}

impl From<&str> for ClientKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

impl From<String> for ClientKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// A response staged by an operator, consumed exactly once by pop-front
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedResponse {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(rename = "response")]
    pub body: Value,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

impl StagedResponse {
    /// Build a staged response after validating body and status code
    pub fn new(body: Value, status_code: u16) -> QueueResult<Self> {
        validate_response_object(&body)?;
        validate_status_code(status_code)?;
        Ok(Self {
            id: Uuid::new_v4(),
            body,
            status_code,
            created_at: Utc::now(),
        })
    }
}

/// Staged responses must be JSON objects
pub fn validate_response_object(body: &Value) -> QueueResult<()> {
    if body.is_object() {
        Ok(())
    } else {
        Err(QueueError::validation(format!(
            "response must be a JSON object, got {}",
            json_kind(body)
        )))
    }
}

/// Status codes must be representable as an HTTP status
pub fn validate_status_code(status_code: u16) -> QueueResult<()> {
    if (100..=599).contains(&status_code) {
        Ok(())
    } else {
        Err(QueueError::validation(format!(
            "status code must be between 100 and 599, got {}",
            status_code
        )))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
