//! Staged Response Queues
//!
//! Per-client FIFO queues of pre-staged responses, written through to a
//! durable backing store on every mutation.
//!
//! # Architecture
//!
//! - **QueueStore**: one ordered queue per client key, serialized per key and
//!   parallel across keys
//! - **QueueBackend**: durable record of the queues, with a JSON file
//!   implementation and an in-memory one
//! - **Transfer**: validated import of queue files and export of queue contents
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use mock_completion::notifications::EventHub;
//! use mock_completion::queue::{ClientKey, MemoryBackend, QueueStore};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = QueueStore::open(Arc::new(MemoryBackend::new()), Arc::new(EventHub::new())).await?;
//! let key = ClientKey::from("127.0.0.1");
//!
//! store.enqueue(&key, json!({"choices": []}), 200).await?;
//! let next = store.pop_front(&key).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod error;
pub mod file_backend;
pub mod store;
pub mod transfer;
pub mod types;

pub use backend::{MemoryBackend, QueueBackend, QueueTable, TableChange};
pub use error::{QueueError, QueueResult};
pub use file_backend::JsonFileBackend;
pub use store::QueueStore;
pub use transfer::{ImportMode, ImportSummary};
pub use types::{ClientKey, StagedResponse, DEFAULT_STATUS_CODE};
