//! Per-client Staged Response Store
//!
//! Holds one FIFO queue per client key. Each queue sits behind its own async
//! mutex, created on first write and kept for the life of the process, so
//! different clients never contend while operations on one client are
//! strictly serialized.
//!
//! Every mutation computes the new queue contents, hands them to the backend,
//! and only swaps them into memory once the backend reports success. A failed
//! write therefore leaves memory exactly matching the durable record.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use log::{debug, info};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::notifications::{HubEvent, Publisher};
use crate::queue::backend::{QueueBackend, QueueTable, TableChange};
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::types::{validate_status_code, ClientKey, StagedResponse};

type Slot = Arc<Mutex<VecDeque<StagedResponse>>>;

/// Write-through store of staged responses partitioned by client key
pub struct QueueStore {
    slots: DashMap<ClientKey, Slot>,
    backend: Arc<dyn QueueBackend>,
    publisher: Arc<dyn Publisher<HubEvent>>,
}

impl QueueStore {
    /// Load persisted queues from `backend` and build the store around them
    pub async fn open(
        backend: Arc<dyn QueueBackend>,
        publisher: Arc<dyn Publisher<HubEvent>>,
    ) -> QueueResult<Self> {
        let table = backend.load().await?;
        let slots = DashMap::new();
        for (key, entries) in table {
            slots.insert(key, Arc::new(Mutex::new(VecDeque::from(entries))));
        }
        info!("Queue store opened on {} with {} clients", backend.describe(), slots.len());

        Ok(Self {
            slots,
            backend,
            publisher,
        })
    }

    fn slot(&self, key: &ClientKey) -> Slot {
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    fn existing_slot(&self, key: &ClientKey) -> Option<Slot> {
        self.slots.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Persist `next` as the new contents of `key`, then install it
    async fn commit(
        &self,
        key: &ClientKey,
        queue: &mut VecDeque<StagedResponse>,
        next: VecDeque<StagedResponse>,
    ) -> QueueResult<usize> {
        self.backend
            .persist(vec![TableChange::new(key.clone(), next.iter().cloned().collect())])
            .await?;
        *queue = next;
        let len = queue.len();
        self.publisher.publish(HubEvent::queue_updated(key.clone(), len));
        Ok(len)
    }

    /// Append one response, returning the new queue length
    pub async fn enqueue(&self, key: &ClientKey, body: Value, status_code: u16) -> QueueResult<usize> {
        let entry = StagedResponse::new(body, status_code)?;
        self.append_entries(key, vec![entry]).await
    }

    /// Append several responses in order, or none of them
    pub async fn enqueue_batch(
        &self,
        key: &ClientKey,
        bodies: Vec<Value>,
        status_code: u16,
    ) -> QueueResult<usize> {
        let entries = build_entries(bodies, status_code)?;
        self.append_entries(key, entries).await
    }

    /// Append already built entries, keeping their ids and status codes
    pub async fn append_entries(
        &self,
        key: &ClientKey,
        entries: Vec<StagedResponse>,
    ) -> QueueResult<usize> {
        if entries.is_empty() {
            return Err(QueueError::validation("at least one response is required"));
        }

        let slot = self.slot(key);
        let mut queue = slot.lock().await;
        let mut next = queue.clone();
        let added = entries.len();
        next.extend(entries);

        let len = self.commit(key, &mut queue, next).await?;
        debug!("Staged {} responses for {} (queue length {})", added, key, len);
        Ok(len)
    }

    /// Discard the queue for `key` and install `bodies` in its place
    pub async fn replace_all(
        &self,
        key: &ClientKey,
        bodies: Vec<Value>,
        status_code: u16,
    ) -> QueueResult<usize> {
        let entries = build_entries(bodies, status_code)?;
        self.replace_entries(key, entries).await
    }

    /// Replace the queue for `key` with already built entries
    pub async fn replace_entries(
        &self,
        key: &ClientKey,
        entries: Vec<StagedResponse>,
    ) -> QueueResult<usize> {
        let slot = self.slot(key);
        let mut queue = slot.lock().await;
        let len = self.commit(key, &mut queue, VecDeque::from(entries)).await?;
        info!("Replaced queue for {} with {} responses", key, len);
        Ok(len)
    }

    /// Take the next staged response; `None` means the queue is empty
    pub async fn pop_front(&self, key: &ClientKey) -> QueueResult<Option<StagedResponse>> {
        let Some(slot) = self.existing_slot(key) else {
            return Ok(None);
        };
        let mut queue = slot.lock().await;
        let Some(front) = queue.front().cloned() else {
            return Ok(None);
        };

        let mut next = queue.clone();
        next.pop_front();
        let remaining = self.commit(key, &mut queue, next).await?;
        debug!("Consumed staged response {} for {} ({} left)", front.id, key, remaining);
        Ok(Some(front))
    }

    /// Copy of the next staged response without consuming it
    pub async fn peek(&self, key: &ClientKey) -> Option<StagedResponse> {
        let slot = self.existing_slot(key)?;
        let queue = slot.lock().await;
        queue.front().cloned()
    }

    /// Ordered copy of one client's queue
    pub async fn snapshot(&self, key: &ClientKey) -> Vec<StagedResponse> {
        match self.existing_slot(key) {
            Some(slot) => slot.lock().await.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Copy of every known queue, each taken under its own lock
    pub async fn snapshot_all(&self) -> QueueTable {
        let mut table = QueueTable::new();
        for key in self.keys() {
            if let Some(slot) = self.existing_slot(&key) {
                let entries = slot.lock().await.iter().cloned().collect();
                table.insert(key, entries);
            }
        }
        table
    }

    /// Empty one client's queue, returning how many entries were discarded
    pub async fn clear(&self, key: &ClientKey) -> QueueResult<usize> {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| QueueError::not_found(format!("queue for {}", key)))?;
        let mut queue = slot.lock().await;
        let removed = queue.len();
        self.commit(key, &mut queue, VecDeque::new()).await?;
        info!("Cleared {} responses for {}", removed, key);
        Ok(removed)
    }

    /// Empty every queue in one durable write
    ///
    /// Queues created while the locks are being taken are picked up as well:
    /// the key set is collected again once every lock is held and the pass
    /// restarts until it stops growing.
    pub async fn clear_all(&self) -> QueueResult<usize> {
        let mut guards = self.lock_every_slot().await;

        let changes: Vec<TableChange> = guards
            .iter()
            .filter(|(_, queue)| !queue.is_empty())
            .map(|(key, _)| TableChange::new(key.clone(), Vec::new()))
            .collect();
        if !changes.is_empty() {
            self.backend.persist(changes).await?;
        }

        let mut removed = 0;
        for (_, queue) in guards.iter_mut() {
            removed += queue.len();
            queue.clear();
        }
        drop(guards);

        self.publisher.publish(HubEvent::all_queues_updated());
        info!("Cleared all queues ({} responses discarded)", removed);
        Ok(removed)
    }

    async fn lock_every_slot(&self) -> Vec<(ClientKey, OwnedMutexGuard<VecDeque<StagedResponse>>)> {
        loop {
            let keys = self.keys();
            // Sorted acquisition keeps multi-key locking deadlock free
            let mut guards = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(slot) = self.existing_slot(key) {
                    guards.push((key.clone(), slot.lock_owned().await));
                }
            }
            // Slots are never removed, so an unchanged count means no new key
            if self.slots.len() == keys.len() {
                return guards;
            }
            debug!("Queue created during clear_all, collecting keys again");
        }
    }

    /// Delete one staged response by id; `false` when the id is not queued
    pub async fn remove(&self, key: &ClientKey, response_id: Uuid) -> QueueResult<bool> {
        let slot = self
            .existing_slot(key)
            .ok_or_else(|| QueueError::not_found(format!("queue for {}", key)))?;
        let mut queue = slot.lock().await;
        let Some(position) = queue.iter().position(|entry| entry.id == response_id) else {
            return Ok(false);
        };

        let mut next = queue.clone();
        next.remove(position);
        self.commit(key, &mut queue, next).await?;
        debug!("Removed staged response {} for {}", response_id, key);
        Ok(true)
    }

    pub async fn len(&self, key: &ClientKey) -> usize {
        match self.existing_slot(key) {
            Some(slot) => slot.lock().await.len(),
            None => 0,
        }
    }

    /// Every client key with a queue, sorted
    pub fn keys(&self) -> Vec<ClientKey> {
        let mut keys: Vec<ClientKey> = self.slots.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}

fn build_entries(bodies: Vec<Value>, status_code: u16) -> QueueResult<Vec<StagedResponse>> {
    validate_status_code(status_code)?;
    bodies
        .into_iter()
        .enumerate()
        .map(|(index, body)| {
            StagedResponse::new(body, status_code).map_err(|e| match e {
                QueueError::Validation { message } => {
                    QueueError::validation(format!("item {}: {}", index, message))
                }
                other => other,
            })
        })
        .collect()
}
