//! Real-time Notification Hub
//!
//! Publish/subscribe fan-out from the engine to connected observers.
//!
//! # Architecture
//!
//! - **Publishers**: the queue store, the resolution broker and bypass forwarding
//! - **Observers**: WebSocket sessions and tests, each holding a `Subscription`
//! - **NotificationHub**: routes events to every observer connected at publish time
//! - **Events**: `HubEvent`, serialized as `{"type": ..., "data": ...}`
//!
//! Delivery is best-effort: there is no replay buffer, a full observer buffer
//! drops events for that observer only, and a disconnected observer is removed.
//!
//! # Example Usage
//!
//! ```no_run
//! use mock_completion::notifications::{EventFilter, HubEvent, NotificationHub, Publisher};
//! use mock_completion::queue::ClientKey;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hub = NotificationHub::<HubEvent>::new();
//! let mut observer = hub.subscribe("dashboard", EventFilter::AcceptAll)?;
//!
//! hub.publish(HubEvent::queue_updated(ClientKey::from("127.0.0.1"), 1));
//! let event = observer.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod events;
pub mod manager;
pub mod traits;


pub use error::{NotificationError, NotificationResult};
pub use events::{ExpiryReason, HubEvent, NotificationEvent};
pub use manager::{NotificationHub, Subscription, SubscriberStats, DEFAULT_OBSERVER_BUFFER};
pub use traits::{DeliveryStats, EventFilter, Publisher};

/// Hub carrying engine events
pub type EventHub = NotificationHub<HubEvent>;
