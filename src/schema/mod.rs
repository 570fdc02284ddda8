#![allow(missing_docs)]
//! Core table definitions
//!
//! Each module declares one table as a [`TableDefinition`] plus the record type
//! its rows decode into. Together they form the core extension, which the
//! migration engine places in the `public` schema.

pub mod agent;
pub mod cache;
pub mod character;
pub mod component;
pub mod embedding;
pub mod entity;
pub mod goal;
pub mod log;
pub mod memory;
pub mod participant;
pub mod relationship;
pub mod room;
pub mod world;

use chrono::{DateTime, Utc};

use crate::migration::definition::{ColumnDefinition, ExtensionSchema, SqlType};
use crate::migration::schema_namespace::CORE_EXTENSION_NAME;

// Re-export record types for convenience
pub use agent::AgentRecord;
pub use cache::CacheRecord;
pub use character::CharacterRecord;
pub use component::ComponentRecord;
pub use embedding::{EmbeddingColumn, EmbeddingRecord, DEFAULT_DIMENSION};
pub use entity::EntityRecord;
pub use goal::GoalRecord;
pub use log::LogRecord;
pub use memory::MemoryRecord;
pub use participant::{ParticipantRecord, ParticipantUserState};
pub use relationship::RelationshipRecord;
pub use room::RoomRecord;
pub use world::WorldRecord;

/// Table names used in the database
pub mod table_names {
    pub const AGENTS: &str = "agents";
    pub const CHARACTERS: &str = "characters";
    pub const MEMORIES: &str = "memories";
    pub const EMBEDDINGS: &str = "embeddings";
    pub const ENTITIES: &str = "entities";
    pub const ROOMS: &str = "rooms";
    pub const WORLDS: &str = "worlds";
    pub const COMPONENTS: &str = "components";
    pub const PARTICIPANTS: &str = "participants";
    pub const RELATIONSHIPS: &str = "relationships";
    pub const GOALS: &str = "goals";
    pub const LOGS: &str = "logs";
    pub const CACHE: &str = "cache";
}

/// Every core table, in declaration order
pub fn core_extension() -> ExtensionSchema {
    ExtensionSchema::new(CORE_EXTENSION_NAME)
        .table(agent::table())
        .table(character::table())
        .table(world::table())
        .table(entity::table())
        .table(room::table())
        .table(component::table())
        .table(participant::table())
        .table(memory::table())
        .table(embedding::table())
        .table(relationship::table())
        .table(goal::table())
        .table(cache::table())
        .table(log::table())
}

pub(crate) fn id_column() -> ColumnDefinition {
    ColumnDefinition::new("id", SqlType::Uuid)
        .primary_key()
        .default_sql("gen_random_uuid()")
}

pub(crate) fn created_at_column() -> ColumnDefinition {
    ColumnDefinition::new("created_at", SqlType::TimestampTz)
        .not_null()
        .default_sql("now()")
}

pub(crate) fn jsonb_object(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, SqlType::Jsonb)
        .not_null()
        .default_value(serde_json::json!({}))
}

pub(crate) fn jsonb_array(name: &str) -> ColumnDefinition {
    ColumnDefinition::new(name, SqlType::Jsonb)
        .not_null()
        .default_value(serde_json::json!([]))
}

/// Milliseconds since the epoch to a timestamp, clamping out-of-range values to now
pub fn timestamp_from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::resolver::resolve_creation_order;

    #[test]
    fn test_core_extension_tables() {
        let core = core_extension();
        assert_eq!(core.name, CORE_EXTENSION_NAME);
        assert_eq!(core.tables.len(), 13);
    }

    #[test]
    fn test_core_creation_order_respects_references() {
        let order = resolve_creation_order(&core_extension().tables);
        let pos = |n: &str| order.iter().position(|t| t == n).unwrap();
        assert!(pos("agents") < pos("entities"));
        assert!(pos("worlds") < pos("rooms"));
        assert!(pos("rooms") < pos("memories"));
        assert!(pos("memories") < pos("embeddings"));
        assert!(pos("entities") < pos("relationships"));
    }

    #[test]
    fn test_every_foreign_key_targets_a_core_table() {
        let core = core_extension();
        for table in &core.tables {
            for fk in &table.foreign_keys {
                assert!(
                    core.get_table(&fk.foreign_table).is_some(),
                    "{} references unknown table {}",
                    table.name,
                    fk.foreign_table
                );
            }
        }
    }
}
