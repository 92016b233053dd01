//! JSON file queue storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rover_core::{QueueEntry, QueueStorage, StorageError};
use serde::{Deserialize, Serialize};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    entries: &'a [QueueEntry],
}

/// Entries stay raw so one undecodable entry cannot take the rest with it.
#[derive(Deserialize)]
struct Envelope {
    version: u32,
    entries: Vec<serde_json::Value>,
}

/// File-backed storage holding the whole queue as one JSON document.
///
/// Saves write a sibling temp file and rename it over the target, so a
/// crash leaves either the previous or the new queue on disk, never a mix.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Storage at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<user cache dir>/rover/events.json`, if the platform has a cache dir.
    #[must_use]
    pub fn default_location() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("rover").join("events.json"))
    }

    /// Storage at [`FileStorage::default_location`].
    ///
    /// # Errors
    /// Returns error if no cache directory is available.
    pub fn in_default_location() -> Result<Self, StorageError> {
        Self::default_location()
            .map(Self::new)
            .ok_or_else(|| StorageError::Internal("No cache directory available".to_string()))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl QueueStorage for FileStorage {
    async fn load(&self) -> Result<Vec<QueueEntry>, StorageError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        if envelope.version != FORMAT_VERSION {
            return Err(StorageError::Internal(format!(
                "Unsupported queue file version {}",
                envelope.version
            )));
        }

        let total = envelope.entries.len();
        let entries: Vec<QueueEntry> = envelope
            .entries
            .into_iter()
            .filter_map(|raw| {
                serde_json::from_value(raw)
                    .map_err(|e| tracing::warn!(error = %e, "Dropping unreadable queue entry"))
                    .ok()
            })
            .collect();
        if entries.len() < total {
            tracing::warn!(
                dropped = total - entries.len(),
                kept = entries.len(),
                path = %self.path.display(),
                "Queue file contained unreadable entries"
            );
        }
        Ok(entries)
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(&EnvelopeRef {
            version: FORMAT_VERSION,
            entries,
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::trace!(path = %self.path.display(), entries = entries.len(), "Saved event queue");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rover_core::{Attributes, Context, Event, EventInfo};

    use super::*;

    fn entry(name: &str) -> QueueEntry {
        let attributes = Attributes::new().with("screen", name).unwrap();
        QueueEntry::new(Event::new(
            EventInfo::new(name).with_attributes(attributes),
            Context::default(),
        ))
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("events.json"));
        assert!(storage.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load_in_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.json");
        let entries = vec![entry("a"), entry("b")];

        FileStorage::new(&path).save(&entries).await.unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.load().await.unwrap(), entries);
        assert!(!reopened.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        tokio::fs::write(&path, b"{ truncated").await.unwrap();

        let err = FileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_unreadable_entry_is_skipped_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        let good = vec![entry("a"), entry("b")];

        let mut document = serde_json::json!({ "version": 1, "entries": good });
        let entries = document["entries"].as_array_mut().unwrap();
        let mut broken = entries[0].clone();
        broken["event"]["attributes"]["screen"] = serde_json::Value::Null;
        entries.insert(1, broken);
        tokio::fs::write(&path, serde_json::to_vec(&document).unwrap())
            .await
            .unwrap();

        let loaded = FileStorage::new(&path).load().await.unwrap();
        assert_eq!(loaded, good);
    }

    #[tokio::test]
    async fn test_unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.json");
        tokio::fs::write(&path, br#"{"version": 99, "entries": []}"#)
            .await
            .unwrap();

        let err = FileStorage::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StorageError::Internal(_)));
    }
}
