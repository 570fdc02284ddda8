#![allow(missing_docs)]
//! Agent schema
//!
//! An agent row carries the character it was booted from, one column per field.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{created_at_column, jsonb_array, jsonb_object};
use crate::migration::definition::{ColumnDefinition, IndexDefinition, SqlType, TableDefinition};
use crate::types::{Agent, Bio, Character, UUID};

pub fn table() -> TableDefinition {
    TableDefinition::new("agents")
        .column(ColumnDefinition::new("id", SqlType::Uuid).primary_key())
        .column(
            ColumnDefinition::new("enabled", SqlType::Boolean)
                .not_null()
                .default_value(serde_json::json!(true)),
        )
        .column(created_at_column())
        .column(
            ColumnDefinition::new("updated_at", SqlType::TimestampTz)
                .not_null()
                .default_sql("now()"),
        )
        .column(ColumnDefinition::new("name", SqlType::Text).not_null())
        .column(ColumnDefinition::new("username", SqlType::Text))
        .column(ColumnDefinition::new("system", SqlType::Text).default_value(serde_json::json!("")))
        .column(ColumnDefinition::new("bio", SqlType::Jsonb).default_value(serde_json::json!([])))
        .column(jsonb_array("message_examples"))
        .column(jsonb_array("post_examples"))
        .column(jsonb_array("topics"))
        .column(jsonb_array("adjectives"))
        .column(jsonb_array("knowledge"))
        .column(jsonb_array("plugins"))
        .column(jsonb_object("settings"))
        .column(jsonb_object("style"))
        .column(jsonb_object("templates"))
        .index(IndexDefinition::new("idx_agents_enabled", ["enabled"]))
        .unique(Some("agents_name_unique"), ["name"])
}

/// Agent record structure for database operations
#[derive(Clone, Debug, Deserialize)]
pub struct AgentRecord {
    pub id: UUID,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub username: Option<String>,
    pub system: Option<String>,
    #[serde(default)]
    pub bio: Option<serde_json::Value>,
    #[serde(default)]
    pub message_examples: serde_json::Value,
    #[serde(default)]
    pub post_examples: serde_json::Value,
    #[serde(default)]
    pub topics: serde_json::Value,
    #[serde(default)]
    pub adjectives: serde_json::Value,
    #[serde(default)]
    pub knowledge: serde_json::Value,
    #[serde(default)]
    pub plugins: serde_json::Value,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default)]
    pub style: serde_json::Value,
    #[serde(default)]
    pub templates: serde_json::Value,
}

fn or_default<T: serde::de::DeserializeOwned + Default>(value: &serde_json::Value) -> T {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

impl AgentRecord {
    pub fn to_agent(&self) -> Agent {
        let bio = match &self.bio {
            Some(serde_json::Value::String(s)) => Bio::Single(s.clone()),
            Some(serde_json::Value::Array(items)) => Bio::Multiple(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect(),
            ),
            _ => Bio::default(),
        };

        let character = Character {
            id: Some(self.id),
            name: self.name.clone(),
            username: self.username.clone(),
            system: self.system.clone().filter(|s| !s.is_empty()),
            bio,
            message_examples: or_default(&self.message_examples),
            post_examples: or_default(&self.post_examples),
            topics: or_default(&self.topics),
            adjectives: or_default(&self.adjectives),
            knowledge: or_default(&self.knowledge),
            plugins: or_default(&self.plugins),
            settings: or_default(&self.settings),
            style: or_default(&self.style),
            templates: or_default(&self.templates),
        };

        Agent {
            id: self.id,
            enabled: self.enabled,
            character,
            created_at: self.created_at.timestamp_millis(),
            updated_at: self.updated_at.timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_to_agent() {
        let id = UUID::new_v4();
        let row = json!({
            "id": id,
            "enabled": false,
            "created_at": "2024-05-01T10:00:00.000+00:00",
            "updated_at": "2024-05-01T10:00:00.000+00:00",
            "name": "Ada",
            "username": null,
            "system": "",
            "bio": ["curious", "kind"],
            "topics": ["math"],
            "settings": {"model": "small"}
        });
        let record: AgentRecord = serde_json::from_value(row).unwrap();
        let agent = record.to_agent();
        assert_eq!(agent.id, id);
        assert!(!agent.enabled);
        assert_eq!(agent.character.bio_string(), "curious\nkind");
        assert_eq!(agent.character.topics, vec!["math"]);
        assert_eq!(agent.character.system, None);
        assert!(agent.character.plugins.is_empty());
        assert_eq!(agent.created_at, 1_714_557_600_000);
    }
}
