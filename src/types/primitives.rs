//! Primitive types shared by every table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier for every persisted row
pub type UUID = uuid::Uuid;

/// A generic type for metadata objects
pub type Metadata = HashMap<String, serde_json::Value>;

/// Message/memory payload.
///
/// Only the fields the storage layer inspects are typed; everything else
/// round-trips through `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Content {
    /// The main text content visible to users
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Actions to be performed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    /// Source/origin of the content (e.g., 'discord', 'telegram')
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// URL of the original message/post
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// UUID of parent message if this is a reply/thread
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<UUID>,
    /// Additional dynamic properties
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Content {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

/// Milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
