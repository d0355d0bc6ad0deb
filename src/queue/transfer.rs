//! Queue Import and Export
//!
//! Translates between queue files and store batch operations. Two input
//! shapes are accepted:
//!
//! - a bare JSON array of response objects, all staged with one status code
//! - an export document produced by [`export`], which carries per-entry
//!   status codes so an exported queue re-imports identically
//!
//! Input is fully validated before the store is touched.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::store::QueueStore;
use crate::queue::types::{
    json_kind, validate_response_object, validate_status_code, ClientKey, StagedResponse,
    DEFAULT_STATUS_CODE,
};
use crate::STATE_FORMAT_VERSION;

/// How imported entries combine with the existing queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    #[default]
    Replace,
    Append,
}

impl FromStr for ImportMode {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "replace" => Ok(ImportMode::Replace),
            "append" => Ok(ImportMode::Append),
            _ => Err(QueueError::validation(format!(
                "invalid import mode '{}', expected replace or append",
                s
            ))),
        }
    }
}

impl fmt::Display for ImportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportMode::Replace => write!(f, "replace"),
            ImportMode::Append => write!(f, "append"),
        }
    }
}

/// Outcome of a successful import
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub client_key: ClientKey,
    pub mode: ImportMode,
    pub imported: usize,
    pub queue_length: usize,
}

/// One exported queue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub response: Value,
    #[serde(default = "default_status_code")]
    pub status_code: u16,
}

fn default_status_code() -> u16 {
    DEFAULT_STATUS_CODE
}

/// The part of an export document that import reads
#[derive(Debug, Deserialize)]
struct ImportDocument {
    entries: Vec<ExportEntry>,
}

impl From<&StagedResponse> for ExportEntry {
    fn from(entry: &StagedResponse) -> Self {
        Self {
            response: entry.body.clone(),
            status_code: entry.status_code,
        }
    }
}

/// Export document for one client's queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueExport {
    pub version: i64,
    pub client_key: ClientKey,
    pub exported_at: DateTime<Utc>,
    pub entries: Vec<ExportEntry>,
}

/// Export document for every queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreExport {
    pub version: i64,
    pub exported_at: DateTime<Utc>,
    pub queues: BTreeMap<ClientKey, Vec<ExportEntry>>,
}

/// Validate an import payload and turn it into staged entries
///
/// `status_code` applies to bare array input; export documents keep their
/// own per-entry codes.
pub fn parse_import(
    payload: &[u8],
    max_bytes: usize,
    status_code: u16,
) -> QueueResult<Vec<StagedResponse>> {
    if payload.len() > max_bytes {
        return Err(QueueError::validation(format!(
            "import payload of {} bytes exceeds the {} byte limit",
            payload.len(),
            max_bytes
        )));
    }
    validate_status_code(status_code)?;

    let text = std::str::from_utf8(payload)
        .map_err(|e| QueueError::validation(format!("import payload is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        return Err(QueueError::validation("import payload is empty"));
    }

    let parsed: Value = serde_json::from_str(text).map_err(|e| {
        QueueError::validation(format!(
            "invalid JSON at line {} column {}: {}",
            e.line(),
            e.column(),
            e
        ))
    })?;

    match parsed {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, body)| {
                validate_response_object(&body).map_err(|_| {
                    QueueError::validation(format!(
                        "item {} is not a JSON object (found {})",
                        index,
                        json_kind(&body)
                    ))
                })?;
                StagedResponse::new(body, status_code)
            })
            .collect(),
        Value::Object(map) if map.contains_key("entries") => {
            let document: ImportDocument = serde_json::from_value(Value::Object(map)).map_err(|e| {
                QueueError::validation(format!("invalid export document: {}", e))
            })?;
            document
                .entries
                .into_iter()
                .enumerate()
                .map(|(index, entry)| {
                    StagedResponse::new(entry.response, entry.status_code).map_err(|e| match e {
                        QueueError::Validation { message } => {
                            QueueError::validation(format!("entry {}: {}", index, message))
                        }
                        other => other,
                    })
                })
                .collect()
        }
        other => Err(QueueError::validation(format!(
            "import file must be a JSON array of response objects, found {}",
            json_kind(&other)
        ))),
    }
}

/// Validate `payload` and install it into `key`'s queue
pub async fn import(
    store: &QueueStore,
    key: &ClientKey,
    payload: &[u8],
    max_bytes: usize,
    status_code: u16,
    mode: ImportMode,
) -> QueueResult<ImportSummary> {
    let entries = parse_import(payload, max_bytes, status_code)?;
    let imported = entries.len();

    let queue_length = match mode {
        ImportMode::Replace => store.replace_entries(key, entries).await?,
        ImportMode::Append if entries.is_empty() => store.len(key).await,
        ImportMode::Append => store.append_entries(key, entries).await?,
    };

    info!("Imported {} responses for {} ({})", imported, key, mode);
    Ok(ImportSummary {
        client_key: key.clone(),
        mode,
        imported,
        queue_length,
    })
}

/// Export one client's queue; an empty or unknown queue is `NotFound`
pub async fn export(store: &QueueStore, key: &ClientKey) -> QueueResult<QueueExport> {
    let entries = store.snapshot(key).await;
    if entries.is_empty() {
        return Err(QueueError::not_found(format!("staged responses for {}", key)));
    }

    Ok(QueueExport {
        version: STATE_FORMAT_VERSION,
        client_key: key.clone(),
        exported_at: Utc::now(),
        entries: entries.iter().map(ExportEntry::from).collect(),
    })
}

/// Export every queue, including empty ones
pub async fn export_all(store: &QueueStore) -> StoreExport {
    let queues = store
        .snapshot_all()
        .await
        .into_iter()
        .map(|(key, entries)| (key, entries.iter().map(ExportEntry::from).collect()))
        .collect();

    StoreExport {
        version: STATE_FORMAT_VERSION,
        exported_at: Utc::now(),
        queues,
    }
}

/// Download file name for an export of `key` taken at `at`
pub fn export_file_name(key: &ClientKey, at: DateTime<Utc>) -> String {
    format!("queue_{}_{}.json", key.file_safe(), at.format("%Y%m%d_%H%M%S"))
}
