//! Response Resolution Engine
//!
//! Process-scoped owner of the queue store, the resolution broker and the
//! notification hub. Built once at startup and torn down on shutdown; every
//! other component reaches the engine through a handle passed to it.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::broker::{BrokerConfig, ResolutionBroker, DEFAULT_FINISHED_HISTORY, DEFAULT_RESOLUTION_TIMEOUT};
use crate::notifications::{EventHub, DEFAULT_OBSERVER_BUFFER};
use crate::queue::{MemoryBackend, QueueBackend, QueueResult, QueueStore};

/// Engine tuning
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub resolution_timeout: Duration,
    pub observer_buffer: usize,
    pub finished_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolution_timeout: DEFAULT_RESOLUTION_TIMEOUT,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
            finished_history: DEFAULT_FINISHED_HISTORY,
        }
    }
}

/// Handle to the running engine; clones share state
#[derive(Clone)]
pub struct Engine {
    hub: Arc<EventHub>,
    store: Arc<QueueStore>,
    broker: Arc<ResolutionBroker>,
}

impl Engine {
    /// Load persisted queues from `backend` and wire the components together
    pub async fn initialize(config: &EngineConfig, backend: Arc<dyn QueueBackend>) -> QueueResult<Self> {
        let hub = Arc::new(EventHub::with_config(config.observer_buffer, None));
        let store = Arc::new(QueueStore::open(backend, hub.clone()).await?);
        let broker = Arc::new(ResolutionBroker::new(
            store.clone(),
            hub.clone(),
            BrokerConfig {
                resolution_timeout: config.resolution_timeout,
                finished_history: config.finished_history,
            },
        ));

        info!(
            "Engine ready (resolution timeout {}s, {} queued clients)",
            config.resolution_timeout.as_secs(),
            store.keys().len()
        );
        Ok(Self { hub, store, broker })
    }

    /// Engine with no durable storage
    pub async fn in_memory(config: &EngineConfig) -> QueueResult<Self> {
        Self::initialize(config, Arc::new(MemoryBackend::new())).await
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    pub fn store(&self) -> &Arc<QueueStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<ResolutionBroker> {
        &self.broker
    }

    /// Abandon pending requests and disconnect observers
    pub fn shutdown(&self) {
        self.broker.shutdown();
        self.hub.shutdown();
        info!("Engine shut down");
    }
}
