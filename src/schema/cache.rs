#![allow(missing_docs)]
//! Cache schema
//!
//! Keyed by `(key, agent_id)` so agents sharing a database never see each
//! other's entries.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::created_at_column;
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType,
    TableDefinition,
};
use crate::types::UUID;

pub fn table() -> TableDefinition {
    TableDefinition::new("cache")
        .column(ColumnDefinition::new("key", SqlType::Text).not_null())
        .column(ColumnDefinition::new("agent_id", SqlType::Uuid).not_null())
        .column(ColumnDefinition::new("value", SqlType::Jsonb).not_null())
        .column(created_at_column())
        .column(ColumnDefinition::new("expires_at", SqlType::TimestampTz))
        .primary_key(["key", "agent_id"])
        .foreign_key(
            ForeignKeyDefinition::new(["agent_id"], "agents", ["id"])
                .on_delete(ReferentialAction::Cascade),
        )
        .index(IndexDefinition::new("idx_cache_expires_at", ["expires_at"]))
}

/// Cache record structure
#[derive(Clone, Debug, Deserialize)]
pub struct CacheRecord {
    pub key: String,
    pub agent_id: UUID,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CacheRecord {
    /// Check if the cache entry is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() > expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::ddl::create_table_sql;

    #[test]
    fn test_cache_uses_composite_key_only() {
        let sql = create_table_sql("public", &table());
        assert_eq!(sql.matches("PRIMARY KEY").count(), 1, "{sql}");
        assert!(sql.contains(r#"CONSTRAINT "cache_key_agent_id_pk" PRIMARY KEY ("key", "agent_id")"#));
    }

    #[test]
    fn test_expiry() {
        let record = |expires_at| CacheRecord {
            key: "k".into(),
            agent_id: UUID::new_v4(),
            value: serde_json::json!(1),
            created_at: Utc::now(),
            expires_at,
        };
        assert!(!record(None).is_expired());
        assert!(record(Some(Utc::now() - chrono::Duration::seconds(5))).is_expired());
        assert!(!record(Some(Utc::now() + chrono::Duration::hours(1))).is_expired());
    }
}
