//! Memory types

use serde::{Deserialize, Serialize};

use super::primitives::{now_ms, Content, UUID};

/// Represents a stored memory/message.
///
/// The table a memory lives in (`messages`, `facts`, `documents`, ...) is not a
/// field; it is passed alongside the memory and stored in the `type` column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Optional unique identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    /// Associated entity ID
    pub entity_id: UUID,
    /// Associated agent ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UUID>,
    /// Optional creation timestamp in milliseconds since epoch
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Memory content
    pub content: Content,
    /// Optional embedding vector for semantic search
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Associated room ID
    pub room_id: UUID,
    /// Associated world ID (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    /// Whether memory is unique (used to prevent duplicates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Embedding similarity score (set when retrieved via search)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f32>,
    /// Metadata for the memory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Memory {
    /// Create a new memory with the given content.
    pub fn new(entity_id: UUID, room_id: UUID, content: Content) -> Self {
        Memory {
            id: Some(UUID::new_v4()),
            entity_id,
            created_at: Some(now_ms()),
            content,
            room_id,
            ..Default::default()
        }
    }

    /// Create a message memory with text content.
    pub fn message(entity_id: UUID, room_id: UUID, text: &str) -> Self {
        Self::new(entity_id, room_id, Content::text(text))
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Well-known memory tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Messages,
    Facts,
    Documents,
    Fragments,
    Knowledge,
}

impl MemoryType {
    pub fn table_name(&self) -> &'static str {
        match self {
            MemoryType::Messages => "messages",
            MemoryType::Facts => "facts",
            MemoryType::Documents => "documents",
            MemoryType::Fragments => "fragments",
            MemoryType::Knowledge => "knowledge",
        }
    }
}
