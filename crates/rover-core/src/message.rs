//! Inbox messages delivered alongside event acknowledgments.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What opening a message does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageAction {
    #[default]
    None,
    Website { url: String },
    /// Landing page document, passed through unmapped for the UI layer.
    LandingPage { document: serde_json::Value },
}

/// A notification message for the inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub saved_to_inbox: bool,
    #[serde(default)]
    pub action: MessageAction,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}
