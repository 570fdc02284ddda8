//! Agent and character types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::primitives::{now_ms, Metadata, UUID};

/// Biography can be a single string or multiple strings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bio {
    /// Single string bio
    Single(String),
    /// Multiple string bio
    Multiple(Vec<String>),
}

impl Default for Bio {
    fn default() -> Self {
        Bio::Single(String::new())
    }
}

/// A named personality/configuration blob
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    /// Optional unique identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<UUID>,
    /// Character name
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub bio: Bio,
    /// Example conversations, one inner list per exchange
    #[serde(default)]
    pub message_examples: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub post_examples: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub adjectives: Vec<String>,
    #[serde(default)]
    pub knowledge: Vec<serde_json::Value>,
    #[serde(default)]
    pub plugins: Vec<String>,
    #[serde(default)]
    pub settings: Metadata,
    #[serde(default)]
    pub style: Metadata,
    /// Prompt templates keyed by template name
    #[serde(default)]
    pub templates: HashMap<String, String>,
}

impl Character {
    pub fn new(name: impl Into<String>) -> Self {
        Character {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Get the bio as a single string
    pub fn bio_string(&self) -> String {
        match &self.bio {
            Bio::Single(s) => s.clone(),
            Bio::Multiple(v) => v.join("\n"),
        }
    }
}

/// A running agent identity; the root of per-agent isolation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: UUID,
    /// Disabled agents keep their rows but are not booted
    pub enabled: bool,
    pub character: Character,
    /// Creation timestamp (ms)
    pub created_at: i64,
    /// Last update timestamp (ms)
    pub updated_at: i64,
}

impl Agent {
    /// Create a new enabled agent from a character
    pub fn from_character(id: UUID, character: Character) -> Self {
        let now = now_ms();
        Agent {
            id,
            enabled: true,
            character,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn name(&self) -> &str {
        &self.character.name
    }
}
