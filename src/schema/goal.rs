#![allow(missing_docs)]
//! Goal schema

use serde::Deserialize;

use super::{created_at_column, id_column, jsonb_array};
use crate::migration::definition::{
    CheckConstraint, ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction,
    SqlType, TableDefinition,
};
use crate::types::{Goal, GoalStatus, Objective, UUID};

pub fn table() -> TableDefinition {
    let cascade = |column: &str, target: &str| {
        ForeignKeyDefinition::new([column], target, ["id"]).on_delete(ReferentialAction::Cascade)
    };
    TableDefinition::new("goals")
        .column(id_column())
        .column(created_at_column())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("entity_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("room_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("name", SqlType::Text).not_null())
        .column(
            ColumnDefinition::new("status", SqlType::Text)
                .not_null()
                .default_value(serde_json::json!(GoalStatus::InProgress.as_str())),
        )
        .column(ColumnDefinition::new("description", SqlType::Text))
        .column(jsonb_array("objectives"))
        .foreign_key(cascade("agent_id", "agents"))
        .foreign_key(cascade("entity_id", "entities"))
        .foreign_key(cascade("room_id", "rooms"))
        .check(CheckConstraint::new(
            "goals_status_check",
            "status IN ('NOT_STARTED', 'IN_PROGRESS', 'DONE', 'FAILED')",
        ))
        .index(IndexDefinition::new("idx_goals_room_entity", ["room_id", "entity_id"]))
}

#[derive(Clone, Debug, Deserialize)]
pub struct GoalRecord {
    pub id: UUID,
    pub agent_id: UUID,
    pub entity_id: UUID,
    pub room_id: UUID,
    pub name: String,
    pub status: GoalStatus,
    pub description: Option<String>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
}

impl GoalRecord {
    pub fn to_goal(&self) -> Goal {
        Goal {
            id: Some(self.id),
            room_id: self.room_id,
            entity_id: self.entity_id,
            name: self.name.clone(),
            status: self.status,
            description: self.description.clone(),
            objectives: self.objectives.clone(),
        }
    }
}
