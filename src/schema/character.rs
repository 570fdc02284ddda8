#![allow(missing_docs)]
//! Character schema
//!
//! Characters are stored whole as JSON, keyed by a unique name, independent of
//! any running agent.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{created_at_column, id_column};
use crate::error::Result;
use crate::migration::definition::{ColumnDefinition, SqlType, TableDefinition};
use crate::types::{Character, UUID};

pub fn table() -> TableDefinition {
    TableDefinition::new("characters")
        .column(id_column())
        .column(ColumnDefinition::new("name", SqlType::Text).not_null())
        .column(ColumnDefinition::new("data", SqlType::Jsonb).not_null())
        .column(created_at_column())
        .column(
            ColumnDefinition::new("updated_at", SqlType::TimestampTz)
                .not_null()
                .default_sql("now()"),
        )
        .unique(Some("characters_name_unique"), ["name"])
}

#[derive(Clone, Debug, Deserialize)]
pub struct CharacterRecord {
    pub id: UUID,
    pub name: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CharacterRecord {
    /// The stored character, with the row's id and name taking precedence
    pub fn to_character(&self) -> Result<Character> {
        let mut character: Character = serde_json::from_value(self.data.clone())?;
        character.id = Some(self.id);
        character.name = self.name.clone();
        Ok(character)
    }
}
