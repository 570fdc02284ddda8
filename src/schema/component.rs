#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_object};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::{Component, UUID};

pub fn table() -> TableDefinition {
    let cascade = |column: &str, target: &str| {
        ForeignKeyDefinition::new([column], target, ["id"]).on_delete(ReferentialAction::Cascade)
    };
    TableDefinition::new("components")
        .column(id_column())
        .column(ColumnDefinition::new("entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("world_id", SqlType::Uuid))
        .column(ColumnDefinition::new("source_entity_id", SqlType::Uuid))
        .column(ColumnDefinition::new("type", SqlType::Text).not_null())
        .column(created_at_column())
        .column(jsonb_object("data"))
        .foreign_key(cascade("entity_id", "entities"))
        .foreign_key(cascade("agent_id", "agents"))
        .foreign_key(cascade("room_id", "rooms"))
        .foreign_key(cascade("world_id", "worlds"))
        .foreign_key(cascade("source_entity_id", "entities"))
        .index(IndexDefinition::new("idx_components_entity_id", ["entity_id"]))
        .index(IndexDefinition::new("idx_components_type", ["type"]))
}

#[derive(Clone, Debug, Deserialize)]
pub struct ComponentRecord {
    pub id: UUID,
    pub entity_id: UUID,
    pub agent_id: UUID,
    pub room_id: UUID,
    pub world_id: Option<UUID>,
    pub source_entity_id: Option<UUID>,
    #[serde(rename = "type")]
    pub component_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ComponentRecord {
    pub fn to_component(&self) -> Component {
        Component {
            id: self.id,
            entity_id: self.entity_id,
            agent_id: self.agent_id,
            room_id: self.room_id,
            world_id: self.world_id,
            source_entity_id: self.source_entity_id,
            component_type: self.component_type.clone(),
            created_at: Some(self.created_at.timestamp_millis()),
            data: self.data.clone(),
        }
    }
}
