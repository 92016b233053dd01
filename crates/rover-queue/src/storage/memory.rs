//! In-memory queue storage.

use std::sync::{
    RwLock,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use rover_core::{QueueEntry, QueueStorage, StorageError};

/// In-memory storage implementation.
///
/// Useful for tests and for hosts that accept losing queued events on
/// restart. Share one instance between queues through an `Arc` to simulate
/// a restart within a single process.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<Vec<QueueEntry>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    /// Create an empty in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage pre-populated with entries.
    #[must_use]
    pub fn with_entries(entries: Vec<QueueEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
            saves: AtomicUsize::new(0),
        }
    }

    /// Currently stored entries.
    ///
    /// # Errors
    /// Returns error if the lock is poisoned.
    pub fn entries(&self) -> Result<Vec<QueueEntry>, StorageError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .clone())
    }

    /// Number of completed saves.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueStorage for MemoryStorage {
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
        self.entries()
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError> {
        *self
            .entries
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))? = entries.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
