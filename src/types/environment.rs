//! Worlds, rooms, entities and the edges between them

use serde::{Deserialize, Serialize};

use super::primitives::{Metadata, UUID};

/// Represents a world (server, guild, or top-level container).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct World {
    pub id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub agent_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Represents a room (channel, chat, or conversation container).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Defaults to the adapter's agent when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<UUID>,
    pub source: String,
    #[serde(rename = "type")]
    pub room_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Entity component - extensible data attached to entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: UUID,
    pub entity_id: UUID,
    pub agent_id: UUID,
    pub room_id: UUID,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_id: Option<UUID>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_entity_id: Option<UUID>,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Represents an entity (user, agent, or other actor).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: UUID,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    pub agent_id: UUID,
    /// Only populated by reads that ask for components
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
}

impl Entity {
    pub fn new(id: UUID, agent_id: UUID, names: Vec<String>) -> Self {
        Entity {
            id,
            names,
            metadata: Metadata::new(),
            agent_id,
            components: None,
        }
    }
}

/// Directed, tagged edge between two entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: UUID,
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
    pub agent_id: UUID,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}
