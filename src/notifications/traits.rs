//! Publisher Traits and Delivery Policy Types
//!
//! Engine components publish through the `Publisher` trait so they stay
//! decoupled from the hub that fans events out to observers.

use crate::notifications::events::NotificationEvent;
use crate::queue::ClientKey;

/// Components that emit events
///
/// Publishing never blocks and never fails from the caller's point of view.
pub trait Publisher<T>: Send + Sync
where
    T: NotificationEvent,
{
    /// Publish an event to all current subscribers
    fn publish(&self, event: T);
}

/// Event filtering options for subscribers
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventFilter {
    /// Accept all events
    #[default]
    AcceptAll,

    /// Accept events about one client, plus events that concern every client
    ClientKey(ClientKey),
}

impl EventFilter {
    /// Check if an event should be accepted
    pub fn should_accept<T: NotificationEvent>(&self, event: &T) -> bool {
        match self {
            EventFilter::AcceptAll => true,
            EventFilter::ClientKey(key) => event.client_key().map_or(true, |k| k == key),
        }
    }
}

/// Statistics about notification delivery
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryStats {
    /// Total events published
    pub events_published: u64,

    /// Total per-subscriber deliveries
    pub events_delivered: u64,

    /// Deliveries dropped because a subscriber buffer was full
    pub events_dropped: u64,

    /// Subscribers removed after their channel closed
    pub subscribers_removed: u64,
}
