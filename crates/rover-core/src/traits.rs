//! Core traits for persistence, delivery and event intake.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Event, EventInfo, Message, QueueEntry, Region};

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Trait for durable queue storage backends.
///
/// `save` replaces the whole stored queue; after it returns, `load` must
/// yield exactly the saved entries, even across process restarts.
#[async_trait]
pub trait QueueStorage: Send + Sync {
    /// Load every persisted entry, oldest first.
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError>;

    /// Atomically replace the persisted queue.
    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError>;
}

/// Delivery error. Every variant is treated as retryable by the queue.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Extra data the server returned with an acknowledged batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmitResponse {
    pub regions: Vec<Region>,
    pub messages: Vec<Message>,
}

/// Trait for batch submission clients.
#[async_trait]
pub trait EventsClient: Send + Sync {
    /// Submit a batch of events, oldest first.
    ///
    /// Timeouts are the client's responsibility; the queue never cancels a
    /// submission in flight.
    async fn submit(&self, events: &[Event]) -> Result<SubmitResponse, ClientError>;
}

/// Anything that accepts events for delivery.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Accept an event. Never fails from the caller's perspective.
    async fn add_event(&self, info: EventInfo);
}
