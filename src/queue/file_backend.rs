//! JSON File Backend
//!
//! Persists the queue table as a single JSON document mapping each client key
//! to its ordered array of staged responses. Each flush rewrites the whole
//! file through a temporary file, `fsync` and `rename`, so a crash leaves
//! either the previous or the new state on disk, never a partial one.
//!
//! Writes are group committed. Every `persist` call applies its change to an
//! in-memory mirror and takes a generation number. Callers then queue on the
//! flush lock; whoever holds it writes the mirror as it stands, which covers
//! every change made up to that point, and callers whose generation is already
//! on disk return without writing again.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::queue::backend::{QueueBackend, QueueTable, TableChange};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::types::{ClientKey, StagedResponse};

#[derive(Debug, Default)]
struct Mirror {
    table: QueueTable,
    generation: u64,
}

/// Write-through JSON file store with coalesced flushes
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    mirror: Mutex<Mirror>,
    /// Highest generation known to be on disk
    flushed: tokio::sync::Mutex<u64>,
    #[cfg(test)]
    failing_flushes: std::sync::atomic::AtomicUsize,
}

/// Queue contents to restore when a flush fails
type Rollback = Vec<(ClientKey, Option<Vec<StagedResponse>>)>;

impl JsonFileBackend {
    /// Create a backend for `path`; the file is created on first write
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mirror: Mutex::new(Mirror::default()),
            flushed: tokio::sync::Mutex::new(0),
            #[cfg(test)]
            failing_flushes: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current mirror to disk unless `generation` is already there
    ///
    /// On failure `rollback` is restored into the mirror before the flush
    /// lock is released, so no later flush can write the failed change.
    async fn flush_through(&self, generation: u64, rollback: Rollback) -> QueueResult<()> {
        let mut flushed = self.flushed.lock().await;
        if *flushed >= generation {
            debug!("Generation {} already flushed by a concurrent writer", generation);
            return Ok(());
        }

        let (snapshot, snapshot_generation) = {
            let mirror = self.mirror.lock();
            (mirror.table.clone(), mirror.generation)
        };

        if let Err(e) = self.write_snapshot(snapshot).await {
            warn!("Persisting queue changes to {} failed: {}", self.path.display(), e);
            // Callers hold the per-key locks for these keys, so nobody else
            // has touched them since they were applied.
            let mut mirror = self.mirror.lock();
            for (key, before) in rollback {
                match before {
                    Some(entries) => {
                        mirror.table.insert(key, entries);
                    }
                    None => {
                        mirror.table.remove(&key);
                    }
                }
            }
            return Err(e);
        }

        debug!(
            "Flushed generation {} to {} (covering {} pending)",
            snapshot_generation,
            self.path.display(),
            snapshot_generation - *flushed
        );
        *flushed = snapshot_generation;
        Ok(())
    }

    async fn write_snapshot(&self, snapshot: QueueTable) -> QueueResult<()> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let pending = self.failing_flushes.load(Ordering::SeqCst);
            if pending > 0 {
                self.failing_flushes.store(pending - 1, Ordering::SeqCst);
                return Err(QueueError::persistence("simulated write failure"));
            }
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &snapshot))
            .await
            .map_err(|e| QueueError::persistence(format!("flush task failed: {}", e)))?
    }
}

#[async_trait]
impl QueueBackend for JsonFileBackend {
    async fn load(&self) -> QueueResult<QueueTable> {
        let path = self.path.clone();
        let table = tokio::task::spawn_blocking(move || read_table(&path))
            .await
            .map_err(|e| QueueError::persistence(format!("load task failed: {}", e)))??;

        let mut mirror = self.mirror.lock();
        mirror.table = table.clone();
        info!(
            "Loaded {} queues ({} staged responses) from {}",
            table.len(),
            table.values().map(Vec::len).sum::<usize>(),
            self.path.display()
        );
        Ok(table)
    }

    async fn persist(&self, changes: Vec<TableChange>) -> QueueResult<()> {
        let (generation, rollback) = {
            let mut mirror = self.mirror.lock();
            let rollback: Rollback = changes
                .into_iter()
                .map(|change| {
                    let before = mirror.table.insert(change.key.clone(), change.entries);
                    (change.key, before)
                })
                .collect();
            mirror.generation += 1;
            (mirror.generation, rollback)
        };

        self.flush_through(generation, rollback).await
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn read_table(path: &Path) -> QueueResult<QueueTable> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No queue data at {}, starting empty", path.display());
            return Ok(QueueTable::new());
        }
        Err(e) => {
            return Err(QueueError::persistence(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )))
        }
    };

    if contents.trim().is_empty() {
        return Ok(QueueTable::new());
    }

    serde_json::from_str(&contents).map_err(|e| {
        QueueError::persistence(format!("corrupt queue data in {}: {}", path.display(), e))
    })
}

fn write_atomically(path: &Path, table: &QueueTable) -> QueueResult<()> {
    let io_error = |what: &str, e: std::io::Error| {
        QueueError::persistence(format!("{} {}: {}", what, path.display(), e))
    };

    let bytes = serde_json::to_vec_pretty(table)
        .map_err(|e| QueueError::persistence(format!("cannot serialize queues: {}", e)))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "queues.json".to_string());
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_error("cannot create directory for", e))?;
    }

    let mut file = File::create(&temp_path).map_err(|e| io_error("cannot create temp file for", e))?;
    file.write_all(&bytes).map_err(|e| io_error("cannot write", e))?;
    file.sync_all().map_err(|e| io_error("cannot sync", e))?;
    drop(file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        io_error("cannot replace", e)
    })?;

    sync_parent_dir(path);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            debug!("Directory sync for {} skipped: {}", parent.display(), e);
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
