#![allow(missing_docs)]
//! Memory schema
//!
//! All memory tables share one physical table; the logical table name lives in
//! `type`. Fragment and document rows must carry the metadata keys readers
//! depend on.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{id_column, jsonb_object};
use crate::migration::definition::{
    CheckConstraint, ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction,
    SqlType, TableDefinition,
};
use crate::types::{Content, Memory, UUID};
use crate::vector::deserialize_optional_vector;

pub fn table() -> TableDefinition {
    TableDefinition::new("memories")
        .column(id_column())
        .column(ColumnDefinition::new("type", SqlType::Text).not_null())
        .column(
            ColumnDefinition::new("created_at", SqlType::TimestampTz)
                .not_null()
                .default_sql("now()"),
        )
        .column(ColumnDefinition::new("content", SqlType::Jsonb).not_null())
        .column(ColumnDefinition::new("entity_id", SqlType::Uuid))
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_id", SqlType::Uuid))
        .column(ColumnDefinition::new("world_id", SqlType::Uuid))
        .column(
            ColumnDefinition::new("unique", SqlType::Boolean)
                .not_null()
                .default_value(serde_json::json!(true)),
        )
        .column(jsonb_object("metadata"))
        .foreign_key(
            ForeignKeyDefinition::new(["entity_id"], "entities", ["id"])
                .named("fk_memories_entity")
                .on_delete(ReferentialAction::Cascade),
        )
        .foreign_key(
            ForeignKeyDefinition::new(["agent_id"], "agents", ["id"])
                .named("fk_memories_agent")
                .on_delete(ReferentialAction::Cascade),
        )
        .foreign_key(
            ForeignKeyDefinition::new(["room_id"], "rooms", ["id"])
                .named("fk_memories_room")
                .on_delete(ReferentialAction::Cascade),
        )
        .index(IndexDefinition::new("idx_memories_type_room", ["type", "room_id"]))
        .index(IndexDefinition::new("idx_memories_world_id", ["world_id"]))
        .index(IndexDefinition::new("idx_memories_metadata_type", ["(metadata->>'type')"]))
        .index(IndexDefinition::new("idx_memories_document_id", ["(metadata->>'documentId')"]))
        .index(IndexDefinition::new(
            "idx_fragments_order",
            ["(metadata->>'documentId')", "(metadata->>'position')"],
        ))
        .check(CheckConstraint::new(
            "fragment_metadata_check",
            "CASE WHEN metadata->>'type' = 'fragment' THEN metadata ? 'documentId' AND metadata ? 'position' ELSE true END",
        ))
        .check(CheckConstraint::new(
            "document_metadata_check",
            "CASE WHEN metadata->>'type' = 'document' THEN metadata ? 'timestamp' ELSE true END",
        ))
}

/// Memory row, optionally joined with its embedding and a similarity score
#[derive(Clone, Debug, Deserialize)]
pub struct MemoryRecord {
    pub id: UUID,
    #[serde(rename = "type")]
    pub memory_type: String,
    pub created_at: DateTime<Utc>,
    pub content: serde_json::Value,
    pub entity_id: Option<UUID>,
    pub agent_id: UUID,
    pub room_id: Option<UUID>,
    pub world_id: Option<UUID>,
    pub unique: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, deserialize_with = "deserialize_optional_vector")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub similarity: Option<f32>,
}

impl MemoryRecord {
    pub fn to_memory(&self) -> Memory {
        let content: Content = serde_json::from_value(self.content.clone()).unwrap_or_default();
        let metadata = match &self.metadata {
            serde_json::Value::Object(map) if map.is_empty() => None,
            serde_json::Value::Null => None,
            other => Some(other.clone()),
        };

        Memory {
            id: Some(self.id),
            entity_id: self.entity_id.unwrap_or_default(),
            agent_id: Some(self.agent_id),
            created_at: Some(self.created_at.timestamp_millis()),
            content,
            embedding: self.embedding.clone(),
            room_id: self.room_id.unwrap_or_default(),
            world_id: self.world_id,
            unique: Some(self.unique),
            similarity: self.similarity,
            metadata,
        }
    }
}
