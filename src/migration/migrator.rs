#![allow(missing_docs)]
//! Two-phase runtime migration engine.
//!
//! Phase 1 creates every missing table (columns, column constraints, composite
//! key, unique clauses) in dependency order with no foreign keys. Phase 2 adds
//! the foreign keys, check constraints and missing unique constraints by name,
//! so tables may be declared in any order, including same-run cycles.
//!
//! A phase-1 failure aborts the run. Anything else that goes wrong (an
//! extension that cannot be installed, an index, one constraint, the history
//! tables) is logged and the run carries on.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ddl::{
    add_check_sql, add_foreign_key_sql, add_unique_sql, create_extension_sql, create_index_sql,
    create_table_sql,
};
use super::definition::{ExtensionSchema, TableDefinition};
use super::resolver::resolve_creation_order;
use super::schema_namespace::SchemaNamespaceManager;
use super::tracker::{schema_hash, MigrationTracker};
use crate::error::{Result, StorageError};
use crate::executor::SqlExecutor;

/// Database extensions the storage layer relies on (vector similarity, fuzzy matching)
pub const REQUIRED_EXTENSIONS: &[&str] = &["vector", "fuzzystrmatch"];

/// What one migration run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub extension: String,
    pub schema: String,
    pub created_tables: Vec<String>,
    pub existing_tables: Vec<String>,
    pub added_constraints: Vec<String>,
    pub existing_constraints: Vec<String>,
    /// Constraint name and the error that made it skip
    pub skipped_constraints: Vec<(String, String)>,
    pub failed_extensions: Vec<String>,
    pub hash: String,
}

impl MigrationReport {
    /// True when the run created nothing and added nothing
    pub fn is_noop(&self) -> bool {
        self.created_tables.is_empty() && self.added_constraints.is_empty()
    }
}

enum ConstraintOutcome {
    Added,
    AlreadyPresent,
    Skipped(String),
}

pub struct RuntimeMigrator {
    executor: Arc<dyn SqlExecutor>,
    namespaces: SchemaNamespaceManager,
    tracker: MigrationTracker,
}

impl RuntimeMigrator {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            namespaces: SchemaNamespaceManager::new(executor.clone()),
            tracker: MigrationTracker::new(executor.clone()),
            executor,
        }
    }

    pub fn tracker(&self) -> &MigrationTracker {
        &self.tracker
    }

    /// Install the required extensions, returning the ones that failed
    pub async fn install_extensions(&self) -> Vec<String> {
        let mut failed = Vec::new();
        for extension in REQUIRED_EXTENSIONS {
            let sql = create_extension_sql(extension);
            debug!(sql = sql.as_str(), "Installing database extension");
            if let Err(e) = self.executor.execute(&sql, &[]).await {
                warn!(extension, error = %e, "Could not install database extension; continuing");
                failed.push(extension.to_string());
            }
        }
        failed
    }

    /// Migrate several extensions in order, stopping at the first fatal failure
    pub async fn migrate_all(&self, schemas: &[ExtensionSchema]) -> Result<Vec<MigrationReport>> {
        let mut reports = Vec::with_capacity(schemas.len());
        for schema in schemas {
            reports.push(self.migrate(schema).await?);
        }
        Ok(reports)
    }

    pub async fn migrate(&self, extension: &ExtensionSchema) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            extension: extension.name.clone(),
            failed_extensions: self.install_extensions().await,
            ..Default::default()
        };

        let schema = self
            .namespaces
            .ensure_plugin_schema(&extension.name)
            .await
            .map_err(|e| e.context(format!("resolve namespace for {}", extension.name)))?;
        report.schema = schema.clone();

        let existing = self
            .namespaces
            .existing_tables(&schema)
            .await
            .map_err(|e| e.context(format!("list tables in {schema}")))?;

        self.create_tables(extension, &schema, &existing, &mut report)
            .await?;
        self.apply_constraints(extension, &schema, &mut report)
            .await?;

        report.hash = schema_hash(extension)?;
        self.track(extension, &report.hash).await;

        info!(
            extension = extension.name.as_str(),
            schema = schema.as_str(),
            created = report.created_tables.len(),
            existing = report.existing_tables.len(),
            constraints_added = report.added_constraints.len(),
            constraints_skipped = report.skipped_constraints.len(),
            "Migration complete"
        );
        Ok(report)
    }

    async fn create_tables(
        &self,
        extension: &ExtensionSchema,
        schema: &str,
        existing: &HashSet<String>,
        report: &mut MigrationReport,
    ) -> Result<()> {
        for name in resolve_creation_order(&extension.tables) {
            let Some(table) = extension.get_table(&name) else {
                continue;
            };

            if existing.contains(&name) {
                debug!(schema, table = name.as_str(), "Table already exists");
                report.existing_tables.push(name.clone());
            } else {
                let sql = create_table_sql(schema, table);
                debug!(sql = sql.as_str(), "Creating table");
                self.executor.execute(&sql, &[]).await.map_err(|e| {
                    StorageError::TableCreation {
                        extension: extension.name.clone(),
                        table: name.clone(),
                        source: Box::new(e),
                    }
                })?;
                report.created_tables.push(name.clone());
            }

            for index in &table.indexes {
                let sql = create_index_sql(schema, &table.name, index);
                debug!(sql = sql.as_str(), "Creating index");
                if let Err(e) = self.executor.execute(&sql, &[]).await {
                    warn!(table = name.as_str(), index = index.name.as_str(), error = %e, "Failed to create index; continuing");
                }
            }
        }
        Ok(())
    }

    async fn apply_constraints(
        &self,
        extension: &ExtensionSchema,
        schema: &str,
        report: &mut MigrationReport,
    ) -> Result<()> {
        for table in &extension.tables {
            // unique clauses of a table created in this run went out with its CREATE TABLE
            let created_now = report.created_tables.contains(&table.name);
            let wants_uniques = !created_now && !table.unique_constraints.is_empty();
            if table.foreign_keys.is_empty() && table.check_constraints.is_empty() && !wants_uniques {
                continue;
            }

            let present = self
                .namespaces
                .existing_constraints(schema, &table.name)
                .await
                .map_err(|e| e.context(format!("list constraints on {schema}.{}", table.name)))?;

            for (name, sql) in constraint_statements(extension, schema, table, wants_uniques) {
                if present.contains(&name) {
                    report.existing_constraints.push(name);
                    continue;
                }
                match self.add_constraint(&sql).await {
                    ConstraintOutcome::Added => report.added_constraints.push(name),
                    ConstraintOutcome::AlreadyPresent => report.existing_constraints.push(name),
                    ConstraintOutcome::Skipped(reason) => {
                        warn!(table = table.name.as_str(), constraint = name.as_str(), error = reason.as_str(), "Skipping constraint");
                        report.skipped_constraints.push((name, reason));
                    }
                }
            }
        }
        Ok(())
    }

    async fn add_constraint(&self, sql: &str) -> ConstraintOutcome {
        debug!(sql, "Adding constraint");
        match self.executor.execute(sql, &[]).await {
            Ok(_) => ConstraintOutcome::Added,
            Err(e) if e.is_already_exists() => ConstraintOutcome::AlreadyPresent,
            Err(e) => ConstraintOutcome::Skipped(e.to_string()),
        }
    }

    async fn track(&self, extension: &ExtensionSchema, hash: &str) {
        if let Err(e) = self.tracker.ensure_tables().await {
            warn!(extension = extension.name.as_str(), error = %e, "Migration history unavailable");
            return;
        }
        let unchanged = match self.tracker.get_last_migration(&extension.name).await {
            Ok(last) => last.is_some_and(|m| m.hash == hash),
            Err(e) => {
                warn!(extension = extension.name.as_str(), error = %e, "Could not read migration history");
                false
            }
        };
        if unchanged {
            return;
        }
        if let Err(e) = self.tracker.record_migration(extension, hash).await {
            warn!(extension = extension.name.as_str(), error = %e, "Could not record migration");
        }
    }
}

/// Named ALTER TABLE statements for a table's phase-2 constraints
fn constraint_statements(
    extension: &ExtensionSchema,
    schema: &str,
    table: &TableDefinition,
    with_uniques: bool,
) -> Vec<(String, String)> {
    let mut statements = Vec::new();
    for fk in &table.foreign_keys {
        let foreign_schema = if extension.get_table(&fk.foreign_table).is_some() {
            schema
        } else {
            fk.foreign_schema.as_deref().unwrap_or("public")
        };
        statements.push((
            fk.name.clone(),
            add_foreign_key_sql(schema, &table.name, fk, foreign_schema),
        ));
    }
    for check in &table.check_constraints {
        statements.push((check.name.clone(), add_check_sql(schema, &table.name, check)));
    }
    if with_uniques {
        for unique in &table.unique_constraints {
            statements.push((unique.name.clone(), add_unique_sql(schema, &table.name, unique)));
        }
    }
    statements
}
