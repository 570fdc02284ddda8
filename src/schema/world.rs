#![allow(missing_docs)]
//! World schema

use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_object};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::{Metadata, World, UUID};

pub fn table() -> TableDefinition {
    TableDefinition::new("worlds")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("name", SqlType::Text))
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("server_id", SqlType::Text))
        .column(jsonb_object("metadata"))
        .foreign_key(
            ForeignKeyDefinition::new(["agent_id"], "agents", ["id"])
                .on_delete(ReferentialAction::Cascade),
        )
        .index(IndexDefinition::new("idx_worlds_agent_id", ["agent_id"]))
}

/// World record structure
#[derive(Clone, Debug, Deserialize)]
pub struct WorldRecord {
    pub id: UUID,
    pub name: Option<String>,
    pub agent_id: UUID,
    pub server_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl WorldRecord {
    pub fn to_world(&self) -> World {
        World {
            id: self.id,
            name: self.name.clone(),
            agent_id: self.agent_id,
            server_id: self.server_id.clone(),
            metadata: self.metadata.clone().unwrap_or_default(),
        }
    }
}
