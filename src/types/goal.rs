//! Goal tracking types

use serde::{Deserialize, Serialize};

use super::primitives::UUID;

/// Lifecycle of a goal
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GoalStatus {
    NotStarted,
    #[default]
    InProgress,
    Done,
    Failed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::NotStarted => "NOT_STARTED",
            GoalStatus::InProgress => "IN_PROGRESS",
            GoalStatus::Done => "DONE",
            GoalStatus::Failed => "FAILED",
        }
    }
}

/// One step of a goal
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Objective {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

/// A tracked objective tied to a room and the user pursuing it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    pub room_id: UUID,
    /// The user the goal belongs to
    pub entity_id: UUID,
    pub name: String,
    #[serde(default)]
    pub status: GoalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered steps
    #[serde(default)]
    pub objectives: Vec<Objective>,
}
