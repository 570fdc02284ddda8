#![allow(missing_docs)]

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{created_at_column, id_column};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::{Log, UUID};

pub fn table() -> TableDefinition {
    let cascade = |column: &str, target: &str| {
        ForeignKeyDefinition::new([column], target, ["id"]).on_delete(ReferentialAction::Cascade)
    };
    TableDefinition::new("logs")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_id", SqlType::Uuid))
        .column(ColumnDefinition::new("type", SqlType::Text).not_null())
        .column(ColumnDefinition::new("body", SqlType::Jsonb).not_null())
        .foreign_key(cascade("agent_id", "agents"))
        .foreign_key(cascade("entity_id", "entities"))
        .foreign_key(cascade("room_id", "rooms"))
        .index(IndexDefinition::new("idx_logs_entity_type", ["entity_id", "type"]))
        .index(IndexDefinition::new("idx_logs_created_at", ["created_at"]))
}

#[derive(Clone, Debug, Deserialize)]
pub struct LogRecord {
    pub id: UUID,
    pub entity_id: UUID,
    pub room_id: Option<UUID>,
    #[serde(rename = "type")]
    pub log_type: String,
    pub body: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LogRecord {
    pub fn to_log(&self) -> Log {
        Log {
            id: self.id,
            entity_id: self.entity_id,
            room_id: self.room_id,
            log_type: self.log_type.clone(),
            body: self.body.clone(),
            created_at: self.created_at.timestamp_millis(),
        }
    }
}
