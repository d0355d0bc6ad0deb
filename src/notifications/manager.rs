//! Notification Hub
//!
//! Central coordinator for the pub/sub notification system. Manages observer
//! registration, event routing and delivery statistics.
//!
//! Every observer owns a bounded channel. Publishing uses `try_send`, so a
//! slow observer loses events instead of stalling the publisher, and an
//! observer whose receiver has gone away is removed on the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::notifications::error::{NotificationError, NotificationResult};
use crate::notifications::events::NotificationEvent;
use crate::notifications::traits::{DeliveryStats, EventFilter, Publisher};

/// Per-observer buffer size used by `NotificationHub::new`
pub const DEFAULT_OBSERVER_BUFFER: usize = 256;

/// Subscriber channel with filter and statistics
struct SubscriberInfo<T>
where
    T: NotificationEvent,
{
    filter: EventFilter,
    sender: mpsc::Sender<T>,
    stats: SubscriberStats,
}

/// Statistics for individual subscribers
#[derive(Debug, Clone, Default)]
pub struct SubscriberStats {
    pub events_received: u64,
    pub events_dropped: u64,
    pub last_event_at: Option<SystemTime>,
}

/// Receiving half handed to an observer on subscription
#[derive(Debug)]
pub struct Subscription<T> {
    id: String,
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Wait for the next event; `None` once the hub has dropped this observer
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take an already buffered event without waiting
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

/// Best-effort fan-out of events to connected observers
pub struct NotificationHub<T>
where
    T: NotificationEvent,
{
    subscribers: Arc<RwLock<HashMap<String, SubscriberInfo<T>>>>,
    global_stats: Arc<Mutex<DeliveryStats>>,
    buffer: usize,
    shutdown: Arc<AtomicBool>,
    max_subscribers: Option<usize>,
}

impl<T> NotificationHub<T>
where
    T: NotificationEvent,
{
    /// Create a new hub with the default per-observer buffer
    pub fn new() -> Self {
        Self::with_config(DEFAULT_OBSERVER_BUFFER, Some(1000))
    }

    /// Create a new hub with custom configuration
    pub fn with_config(buffer: usize, max_subscribers: Option<usize>) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            global_stats: Arc::new(Mutex::new(DeliveryStats::default())),
            buffer: buffer.max(1),
            shutdown: Arc::new(AtomicBool::new(false)),
            max_subscribers,
        }
    }

    fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Register an observer and hand back its receiving half
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        filter: EventFilter,
    ) -> NotificationResult<Subscription<T>> {
        if self.is_shutting_down() {
            return Err(NotificationError::SystemShutdown);
        }

        let subscriber_id = subscriber_id.into();
        let mut subscribers = self.subscribers.write();

        if let Some(max) = self.max_subscribers {
            if subscribers.len() >= max {
                return Err(NotificationError::SubscriberLimit(max));
            }
        }

        if subscribers.contains_key(&subscriber_id) {
            return Err(NotificationError::subscriber_already_exists(subscriber_id));
        }

        let (sender, receiver) = mpsc::channel(self.buffer);
        subscribers.insert(
            subscriber_id.clone(),
            SubscriberInfo {
                filter,
                sender,
                stats: SubscriberStats::default(),
            },
        );
        debug!("Subscribed '{}' to notifications", subscriber_id);

        Ok(Subscription {
            id: subscriber_id,
            receiver,
        })
    }

    /// Unsubscribe an observer by ID
    pub fn unsubscribe(&self, subscriber_id: &str) -> NotificationResult<()> {
        if self.subscribers.write().remove(subscriber_id).is_some() {
            debug!("Unsubscribed '{}' from notifications", subscriber_id);
            Ok(())
        } else {
            Err(NotificationError::subscriber_not_found(subscriber_id))
        }
    }

    /// Deliver an event to every accepting observer, returning the delivery count
    pub fn broadcast(&self, event: T) -> NotificationResult<usize> {
        if self.is_shutting_down() {
            return Err(NotificationError::SystemShutdown);
        }

        let mut subscribers = self.subscribers.write();
        let mut delivered = 0u64;
        let mut dropped = 0u64;
        let mut closed = Vec::new();

        for (subscriber_id, info) in subscribers.iter_mut() {
            if !info.filter.should_accept(&event) {
                continue;
            }
            match info.sender.try_send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    info.stats.events_received += 1;
                    info.stats.last_event_at = Some(SystemTime::now());
                }
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    info.stats.events_dropped += 1;
                    warn!(
                        "Observer '{}' buffer full, dropped {} event",
                        subscriber_id,
                        event.event_type()
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(subscriber_id.clone()),
            }
        }

        for subscriber_id in &closed {
            subscribers.remove(subscriber_id);
            debug!("Removed disconnected observer '{}'", subscriber_id);
        }
        drop(subscribers);

        let mut stats = self.global_stats.lock();
        stats.events_published += 1;
        stats.events_delivered += delivered;
        stats.events_dropped += dropped;
        stats.subscribers_removed += closed.len() as u64;

        debug!(
            "Published {} event to {} observers ({} dropped)",
            event.event_type(),
            delivered,
            dropped
        );
        Ok(delivered as usize)
    }

    /// Get delivery statistics
    pub fn get_stats(&self) -> DeliveryStats {
        self.global_stats.lock().clone()
    }

    /// Get subscriber-specific statistics
    pub fn get_subscriber_stats(&self, subscriber_id: &str) -> Option<SubscriberStats> {
        self.subscribers
            .read()
            .get(subscriber_id)
            .map(|info| info.stats.clone())
    }

    /// List all subscriber IDs
    pub fn list_subscribers(&self) -> Vec<String> {
        self.subscribers.read().keys().cloned().collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn has_subscriber(&self, subscriber_id: &str) -> bool {
        self.subscribers.read().contains_key(subscriber_id)
    }

    /// Stop accepting events and disconnect every observer
    pub fn shutdown(&self) {
        debug!("Shutting down notification hub");
        self.shutdown.store(true, Ordering::Release);

        let mut subscribers = self.subscribers.write();
        let subscriber_count = subscribers.len();
        subscribers.clear();

        debug!(
            "Notification hub shutdown complete ({} observers removed)",
            subscriber_count
        );
    }
}

impl<T> Publisher<T> for NotificationHub<T>
where
    T: NotificationEvent,
{
    fn publish(&self, event: T) {
        if let Err(e) = self.broadcast(event) {
            debug!("Event not published: {}", e);
        }
    }
}

impl<T> Default for NotificationHub<T>
where
    T: NotificationEvent,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for NotificationHub<T>
where
    T: NotificationEvent,
{
    fn clone(&self) -> Self {
        Self {
            subscribers: Arc::clone(&self.subscribers),
            global_stats: Arc::clone(&self.global_stats),
            buffer: self.buffer,
            shutdown: Arc::clone(&self.shutdown),
            max_subscribers: self.max_subscribers,
        }
    }
}
