#![allow(missing_docs)]
//! Room schema

use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_object};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::{Metadata, Room, UUID};

pub fn table() -> TableDefinition {
    TableDefinition::new("rooms")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("name", SqlType::Text))
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid))
        .column(ColumnDefinition::new("source", SqlType::Text).not_null())
        .column(ColumnDefinition::new("type", SqlType::Text).not_null())
        .column(ColumnDefinition::new("channel_id", SqlType::Text))
        .column(ColumnDefinition::new("server_id", SqlType::Text))
        .column(ColumnDefinition::new("world_id", SqlType::Uuid))
        .column(jsonb_object("metadata"))
        .foreign_key(
            ForeignKeyDefinition::new(["agent_id"], "agents", ["id"])
                .on_delete(ReferentialAction::Cascade),
        )
        .foreign_key(
            ForeignKeyDefinition::new(["world_id"], "worlds", ["id"])
                .on_delete(ReferentialAction::SetNull),
        )
        .index(IndexDefinition::new("idx_rooms_agent_id", ["agent_id"]))
        .index(IndexDefinition::new("idx_rooms_world_id", ["world_id"]))
}

/// Room record structure
#[derive(Clone, Debug, Deserialize)]
pub struct RoomRecord {
    pub id: UUID,
    pub name: Option<String>,
    pub agent_id: Option<UUID>,
    pub source: String,
    #[serde(rename = "type")]
    pub room_type: String,
    pub channel_id: Option<String>,
    pub server_id: Option<String>,
    pub world_id: Option<UUID>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl RoomRecord {
    pub fn to_room(&self) -> Room {
        Room {
            id: self.id,
            name: self.name.clone(),
            agent_id: self.agent_id,
            source: self.source.clone(),
            room_type: self.room_type.clone(),
            channel_id: self.channel_id.clone(),
            server_id: self.server_id.clone(),
            world_id: self.world_id,
            metadata: self.metadata.clone().unwrap_or_default(),
        }
    }
}
