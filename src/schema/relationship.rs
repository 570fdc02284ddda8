#![allow(missing_docs)]
//! Relationship schema
//!
//! Tags are a `TEXT[]` so tag filters can use the array overlap operator.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_object};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::{Metadata, Relationship, UUID};

pub fn table() -> TableDefinition {
    let cascade = |column: &str, target: &str| {
        ForeignKeyDefinition::new([column], target, ["id"]).on_delete(ReferentialAction::Cascade)
    };
    TableDefinition::new("relationships")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("source_entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("target_entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(
            ColumnDefinition::new("tags", SqlType::Array(Box::new(SqlType::Text)))
                .not_null()
                .default_value(serde_json::json!([])),
        )
        .column(jsonb_object("metadata"))
        .foreign_key(cascade("source_entity_id", "entities"))
        .foreign_key(cascade("target_entity_id", "entities"))
        .foreign_key(cascade("agent_id", "agents"))
        .unique(
            Some("unique_relationship"),
            ["source_entity_id", "target_entity_id", "agent_id"],
        )
        .index(IndexDefinition::new(
            "idx_relationships_users",
            ["source_entity_id", "target_entity_id"],
        ))
        .index(IndexDefinition::new("idx_relationships_tags", ["tags"]).using("gin"))
}

/// Relationship record structure
#[derive(Clone, Debug, Deserialize)]
pub struct RelationshipRecord {
    pub id: UUID,
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
    pub agent_id: UUID,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

impl RelationshipRecord {
    pub fn to_relationship(&self) -> Relationship {
        Relationship {
            id: self.id,
            source_entity_id: self.source_entity_id,
            target_entity_id: self.target_entity_id,
            agent_id: self.agent_id,
            tags: self.tags.clone(),
            metadata: self.metadata.clone().unwrap_or_default(),
            created_at: Some(self.created_at.timestamp_millis()),
        }
    }
}
