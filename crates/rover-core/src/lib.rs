//! Core abstractions for the Rover event pipeline.
//!
//! This crate provides the fundamental building blocks:
//! - `Event`, `EventInfo`, `QueueEntry` - Event records and queue bookkeeping
//! - `Attributes` - Validated event attribute maps
//! - `Context` and `ContextRegistry` - Device/user snapshots from providers
//! - `Notifier` - Broadcast of delivery notifications
//! - `RoverConfig` - Queue and session configuration
//! - Storage, client and sink traits

pub mod attributes;
pub mod config;
pub mod context;
pub mod event;
pub mod lifecycle;
pub mod message;
pub mod notify;
pub mod region;
pub mod traits;

pub use attributes::{AttributeError, AttributeValue, Attributes};
pub use config::{ConfigError, QueueConfig, RoverConfig, SessionConfig};
pub use context::{Context, ContextProvider, ContextRegistry};
pub use event::{Event, EventId, EventInfo, QueueEntry};
pub use lifecycle::AppLifecycle;
pub use message::{Message, MessageAction};
pub use notify::{Notification, Notifier};
pub use region::Region;
pub use traits::{
    ClientError, EventSink, EventsClient, QueueStorage, StorageError, SubmitResponse,
};
