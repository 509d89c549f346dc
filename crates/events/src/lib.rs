//! Sync event bus for fieldledger.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`SyncEvent`]: the event envelope.
//! - [`EventLogger`]: background task that logs every event via `tracing`.

pub mod bus;
pub mod logger;

pub use bus::{EventBus, SyncEvent, SyncEventKind};
pub use logger::EventLogger;
