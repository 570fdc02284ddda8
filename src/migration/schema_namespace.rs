#![allow(missing_docs)]
//! Schema namespace utilities for extension isolation.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::ddl::quote_ident;
use crate::error::{Result, StorageError};
use crate::executor::SqlExecutor;

/// The core storage extension; its tables live in `public`
pub const CORE_EXTENSION_NAME: &str = "@elizaos/plugin-sql";

/// Reserved schema names that extensions cannot use.
const RESERVED_SCHEMAS: &[&str] = &["public", "pg_catalog", "information_schema", "migrations"];

static SCOPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^@[^/]+/").expect("valid scope regex"));
static PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^plugin-").expect("valid prefix regex"));

/// Derive a database schema name from an extension name.
///
/// - the core extension uses the `public` schema
/// - other extensions: remove npm scope, remove `plugin-` prefix, normalize
///
/// # Arguments
/// * `plugin_name` - Extension identifier (e.g., '@your-org/plugin-name')
///
/// # Returns
/// Database schema name (e.g., 'name' for '@your-org/plugin-name')
pub fn derive_schema_name(plugin_name: &str) -> String {
    if plugin_name == CORE_EXTENSION_NAME {
        return "public".to_string();
    }

    let schema_name = SCOPE_RE.replace(plugin_name, "");
    let schema_name = PREFIX_RE.replace(&schema_name, "").to_lowercase();

    let mut schema_name = normalize_schema_name(&schema_name);

    if schema_name.is_empty() || RESERVED_SCHEMAS.contains(&schema_name.as_str()) {
        // Fall back to the full extension name with safe characters
        schema_name = format!(
            "plugin_{}",
            normalize_schema_name(&plugin_name.to_lowercase())
        );
    }

    // PostgreSQL identifiers must start with a letter
    if !schema_name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic())
    {
        schema_name = format!("p_{}", schema_name);
    }

    if schema_name.len() > 63 {
        schema_name.truncate(63);
    }

    schema_name
}

/// Replace runs of non-alphanumerics with a single underscore and trim the ends.
fn normalize_schema_name(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut prev_was_underscore = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            prev_was_underscore = false;
        } else if !prev_was_underscore {
            result.push('_');
            prev_was_underscore = true;
        }
    }

    result.trim_matches('_').to_string()
}

/// Only alphanumerics and underscores are accepted as schema names
pub fn validate_schema_name(schema_name: &str) -> Result<()> {
    if schema_name.is_empty()
        || !schema_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(StorageError::InvalidIdentifier(schema_name.to_string()));
    }
    Ok(())
}

/// Schema namespace manager for extension isolation.
///
/// Also answers the catalog questions the migration engine asks to stay idempotent.
pub struct SchemaNamespaceManager {
    executor: Arc<dyn SqlExecutor>,
}

impl SchemaNamespaceManager {
    pub fn new(executor: Arc<dyn SqlExecutor>) -> Self {
        Self { executor }
    }

    /// Ensure a database schema exists.
    ///
    /// # Errors
    /// Returns error if schema name is invalid or creation fails
    pub async fn ensure_schema_exists(&self, schema_name: &str) -> Result<()> {
        if schema_name == "public" {
            return Ok(());
        }
        validate_schema_name(schema_name)?;

        let query = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema_name));
        self.executor
            .execute(&query, &[])
            .await
            .map_err(|e| e.context(format!("create schema {schema_name}")))?;

        debug!(schema_name, "Ensured schema exists");
        Ok(())
    }

    /// Ensure the schema for an extension exists and return its name.
    pub async fn ensure_plugin_schema(&self, plugin_name: &str) -> Result<String> {
        let schema_name = derive_schema_name(plugin_name);
        self.ensure_schema_exists(&schema_name).await?;
        Ok(schema_name)
    }

    pub async fn schema_exists(&self, schema_name: &str) -> Result<bool> {
        let row = self
            .executor
            .fetch_optional(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name = $1",
                &[schema_name.into()],
            )
            .await?;
        Ok(row.is_some())
    }

    /// List all extension schemas (excluding system schemas).
    pub async fn list_plugin_schemas(&self) -> Result<Vec<String>> {
        let rows = self
            .executor
            .fetch_all(
                r#"
                SELECT schema_name
                FROM information_schema.schemata
                WHERE schema_name NOT IN ('public', 'information_schema', 'pg_catalog', 'pg_toast', 'migrations')
                AND schema_name NOT LIKE 'pg_%'
                ORDER BY schema_name
                "#,
                &[],
            )
            .await?;
        Ok(string_column(rows, "schema_name"))
    }

    /// Base tables currently present in a schema
    pub async fn existing_tables(&self, schema_name: &str) -> Result<HashSet<String>> {
        let rows = self
            .executor
            .fetch_all(
                r#"
                SELECT table_name
                FROM information_schema.tables
                WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                "#,
                &[schema_name.into()],
            )
            .await?;
        Ok(string_column(rows, "table_name").into_iter().collect())
    }

    /// Names of every constraint (PK, unique, FK, check) declared on a table
    pub async fn existing_constraints(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<HashSet<String>> {
        let rows = self
            .executor
            .fetch_all(
                r#"
                SELECT constraint_name
                FROM information_schema.table_constraints
                WHERE table_schema = $1 AND table_name = $2
                "#,
                &[schema_name.into(), table_name.into()],
            )
            .await?;
        Ok(string_column(rows, "constraint_name").into_iter().collect())
    }
}

fn string_column(rows: Vec<crate::executor::Row>, column: &str) -> Vec<String> {
    rows.into_iter()
        .filter_map(|mut row| match row.remove(column) {
            Some(serde_json::Value::String(s)) => Some(s),
            _ => None,
        })
        .collect()
}
