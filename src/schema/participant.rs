#![allow(missing_docs)]
//! Participant schema: the join between entities and rooms

use serde::{Deserialize, Serialize};

use super::{created_at_column, id_column};
use crate::migration::definition::{
    CheckConstraint, ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction,
    SqlType, TableDefinition,
};
use crate::types::UUID;

/// Per-user room state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParticipantUserState {
    Followed,
    Muted,
}

impl ParticipantUserState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantUserState::Followed => "FOLLOWED",
            ParticipantUserState::Muted => "MUTED",
        }
    }
}

pub fn table() -> TableDefinition {
    let cascade = |column: &str, target: &str| {
        ForeignKeyDefinition::new([column], target, ["id"]).on_delete(ReferentialAction::Cascade)
    };
    TableDefinition::new("participants")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_state", SqlType::Text))
        .foreign_key(cascade("entity_id", "entities"))
        .foreign_key(cascade("room_id", "rooms"))
        .foreign_key(cascade("agent_id", "agents"))
        .unique(Some("participants_entity_room_agent_unique"), ["entity_id", "room_id", "agent_id"])
        .check(CheckConstraint::new(
            "participants_room_state_check",
            "room_state IS NULL OR room_state IN ('FOLLOWED', 'MUTED')",
        ))
        .index(IndexDefinition::new("idx_participants_user", ["entity_id"]))
        .index(IndexDefinition::new("idx_participants_room", ["room_id"]))
}

#[derive(Clone, Debug, Deserialize)]
pub struct ParticipantRecord {
    pub id: UUID,
    pub entity_id: UUID,
    pub room_id: UUID,
    pub agent_id: UUID,
    pub room_state: Option<ParticipantUserState>,
}
