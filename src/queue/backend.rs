//! Durable Backing Store Abstraction
//!
//! The queue store writes every mutation through a `QueueBackend` before the
//! change becomes visible in memory. Backends receive the full post-mutation
//! contents of each changed queue, so they never need to replay operations.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::types::{ClientKey, StagedResponse};

/// Complete persisted state: every known client with its ordered queue
pub type QueueTable = BTreeMap<ClientKey, Vec<StagedResponse>>;

/// New contents of one client's queue
#[derive(Debug, Clone, PartialEq)]
pub struct TableChange {
    pub key: ClientKey,
    pub entries: Vec<StagedResponse>,
}

impl TableChange {
    pub fn new(key: ClientKey, entries: Vec<StagedResponse>) -> Self {
        Self { key, entries }
    }
}

/// Durable record of queue contents
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Read the persisted table at startup
    async fn load(&self) -> QueueResult<QueueTable>;

    /// Durably apply a set of queue changes; returns only once they are recorded
    async fn persist(&self, changes: Vec<TableChange>) -> QueueResult<()>;

    /// Human readable location, used in log messages
    fn describe(&self) -> String;
}

/// In-memory backend for tests, benchmarks and ephemeral runs
#[derive(Debug, Default)]
pub struct MemoryBackend {
    table: Mutex<QueueTable>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that starts out holding `table`
    pub fn with_table(table: QueueTable) -> Self {
        Self {
            table: Mutex::new(table),
            ..Self::default()
        }
    }

    /// Make subsequent writes fail, simulating an unavailable disk
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful persist calls
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the recorded table
    pub fn table(&self) -> QueueTable {
        self.table.lock().clone()
    }
}

#[async_trait]
impl QueueBackend for MemoryBackend {
    async fn load(&self) -> QueueResult<QueueTable> {
        Ok(self.table.lock().clone())
    }

    async fn persist(&self, changes: Vec<TableChange>) -> QueueResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(QueueError::persistence("memory backend configured to fail writes"));
        }

        let mut table = self.table.lock();
        for change in changes {
            debug!("Recording {} entries for {}", change.entries.len(), change.key);
            table.insert(change.key, change.entries);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
