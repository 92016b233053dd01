//! Events and queue entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attributes, Context};

/// Event identifier.
pub type EventId = Uuid;

/// Description of something that happened, before enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    /// Explicit occurrence time. Defaults to enqueue time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EventInfo {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// An enriched, immutable event ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub context: Context,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Enrich an `EventInfo` with a context snapshot.
    #[must_use]
    pub fn new(info: EventInfo, context: Context) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: info.name,
            namespace: info.namespace,
            attributes: info.attributes,
            context,
            timestamp: info.timestamp.unwrap_or_else(Utc::now),
        }
    }
}

/// An event plus delivery bookkeeping, as held by the queue and its storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub event: Event,
    pub enqueued_at: DateTime<Utc>,
    /// Failed delivery attempts so far.
    #[serde(default)]
    pub attempt_count: u32,
}

impl QueueEntry {
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
            attempt_count: 0,
        }
    }
}
