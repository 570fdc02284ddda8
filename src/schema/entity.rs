#![allow(missing_docs)]
//! Entity schema

use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_array, jsonb_object};
use crate::migration::definition::{
    ForeignKeyDefinition, IndexDefinition, ReferentialAction, TableDefinition,
};
use crate::migration::definition::{ColumnDefinition, SqlType};
use crate::types::{Entity, Metadata, UUID};

pub fn table() -> TableDefinition {
    TableDefinition::new("entities")
        .column(id_column())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(created_at_column())
        .column(jsonb_array("names"))
        .column(jsonb_object("metadata"))
        .foreign_key(
            ForeignKeyDefinition::new(["agent_id"], "agents", ["id"])
                .on_delete(ReferentialAction::Cascade),
        )
        .unique(Some("entities_id_agent_id_unique"), ["id", "agent_id"])
        .index(IndexDefinition::new("idx_entities_agent_id", ["agent_id"]))
}

/// Entity record structure
#[derive(Clone, Debug, Deserialize)]
pub struct EntityRecord {
    pub id: UUID,
    pub agent_id: UUID,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl EntityRecord {
    pub fn to_entity(&self) -> Entity {
        Entity {
            id: self.id,
            names: self.names.clone(),
            metadata: self.metadata.clone().unwrap_or_default(),
            agent_id: self.agent_id,
            components: None,
        }
    }
}
