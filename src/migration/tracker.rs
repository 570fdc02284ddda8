#![allow(missing_docs)]
//! Migration tracker for recording migration history.
//!
//! History lives in the `migrations` schema: one `_migrations` row per run that
//! changed something, plus a `_snapshots` row holding the definitions that were
//! applied. The content hash makes it cheap to tell whether an extension's
//! declared tables changed since the last run.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use super::definition::{ExtensionSchema, DEFINITION_FORMAT_VERSION};
use crate::error::Result;
use crate::executor::{decode_row, SqlExecutor, SqlValue, Statement};
use crate::types::now_ms;

/// Stable content hash of an extension's table definitions
pub fn schema_hash(schema: &ExtensionSchema) -> Result<String> {
    let encoded = serde_json::to_vec(&schema.tables)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub id: i64,
    pub hash: String,
    pub created_at: i64,
}

/// Summary of an extension's migration history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub has_run: bool,
    pub last_migration: Option<MigrationRecord>,
    pub snapshots: i64,
}

#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

/// Tracks migration history per extension.
pub struct MigrationTracker {
    executor: Arc<dyn SqlExecutor>,
}

impl MigrationTracker {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    pub async fn ensure_tables(&self) -> Result<()> {
        let statements = [
            "CREATE SCHEMA IF NOT EXISTS migrations",
            r#"
            CREATE TABLE IF NOT EXISTS migrations._migrations (
                id SERIAL PRIMARY KEY,
                plugin_name TEXT NOT NULL,
                hash TEXT NOT NULL,
                created_at BIGINT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_migrations_plugin_name ON migrations._migrations(plugin_name)",
            r#"
            CREATE TABLE IF NOT EXISTS migrations._snapshots (
                id SERIAL PRIMARY KEY,
                plugin_name TEXT NOT NULL,
                idx INTEGER NOT NULL,
                format_version INTEGER NOT NULL,
                snapshot JSONB NOT NULL,
                created_at BIGINT NOT NULL,
                UNIQUE(plugin_name, idx)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_snapshots_plugin_name ON migrations._snapshots(plugin_name)",
        ];
        for sql in statements {
            self.executor
                .execute(sql, &[])
                .await
                .map_err(|e| e.context("initialize migration tracking tables"))?;
        }

        debug!("Migration tracking tables initialized");
        Ok(())
    }

    pub async fn get_last_migration(&self, plugin_name: &str) -> Result<Option<MigrationRecord>> {
        let row = self
            .executor
            .fetch_optional(
                r#"
                SELECT id::bigint AS id, hash, created_at
                FROM migrations._migrations
                WHERE plugin_name = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
                &[plugin_name.into()],
            )
            .await
            .map_err(|e| e.context("query last migration"))?;

        row.map(decode_row).transpose()
    }

    /// Record a run and snapshot the definitions it applied
    pub async fn record_migration(&self, schema: &ExtensionSchema, hash: &str) -> Result<()> {
        let plugin_name = schema.name.as_str();
        let created_at = now_ms();
        let snapshot = serde_json::to_value(&schema.tables)?;

        self.executor
            .transaction(&[
                Statement::new(
                    "INSERT INTO migrations._migrations (plugin_name, hash, created_at) VALUES ($1, $2, $3)",
                    vec![plugin_name.into(), hash.into(), created_at.into()],
                ),
                Statement::new(
                    r#"
                    INSERT INTO migrations._snapshots (plugin_name, idx, format_version, snapshot, created_at)
                    SELECT $1, COALESCE(MAX(idx) + 1, 0), $2, $3, $4
                    FROM migrations._snapshots
                    WHERE plugin_name = $1
                    "#,
                    vec![
                        plugin_name.into(),
                        SqlValue::Int(Some(i64::from(DEFINITION_FORMAT_VERSION))),
                        snapshot.into(),
                        created_at.into(),
                    ],
                ),
            ])
            .await
            .map_err(|e| e.context("record migration"))?;

        debug!(plugin_name, hash, "Recorded migration");
        Ok(())
    }

    pub async fn get_status(&self, plugin_name: &str) -> Result<MigrationStatus> {
        let last_migration = self.get_last_migration(plugin_name).await?;

        let snapshots = match self
            .executor
            .fetch_optional(
                "SELECT COUNT(*)::bigint AS count FROM migrations._snapshots WHERE plugin_name = $1",
                &[plugin_name.into()],
            )
            .await
            .map_err(|e| e.context("count snapshots"))?
        {
            Some(row) => decode_row::<CountRow>(row)?.count,
            None => 0,
        };

        Ok(MigrationStatus {
            has_run: last_migration.is_some(),
            last_migration,
            snapshots,
        })
    }
}
