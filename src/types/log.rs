//! Audit log rows

use serde::{Deserialize, Serialize};

use super::primitives::UUID;

/// An append-only audit row
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub id: UUID,
    /// The user the entry is about
    pub entity_id: UUID,
    pub room_id: Option<UUID>,
    #[serde(rename = "type")]
    pub log_type: String,
    pub body: serde_json::Value,
    pub created_at: i64,
}
