//! In-memory stand-in for a PostgreSQL catalog.
//!
//! Understands just enough DDL to track schemas, tables and named constraints,
//! and answers the information_schema queries the migration engine asks.

#![allow(dead_code)]

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::json;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use elizaos_persistence::executor::{DatabaseKind, Row, SqlExecutor, SqlValue, Statement};
use elizaos_persistence::{Result, StorageError};

static CREATE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^CREATE EXTENSION IF NOT EXISTS "([^"]+)""#).unwrap());
static CREATE_SCHEMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^CREATE SCHEMA IF NOT EXISTS "?([^"\s]+)"?"#).unwrap());
static CREATE_TABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^CREATE TABLE IF NOT EXISTS "([^"]+)"\."([^"]+)""#).unwrap());
static INLINE_CONSTRAINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"CONSTRAINT "([^"]+)""#).unwrap());
static CREATE_INDEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^CREATE (?:UNIQUE )?INDEX IF NOT EXISTS "([^"]+)" ON "([^"]+)"\."([^"]+)""#).unwrap()
});
static ADD_CONSTRAINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^ALTER TABLE "([^"]+)"\."([^"]+)" ADD CONSTRAINT "([^"]+)""#).unwrap()
});
static REFERENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"REFERENCES "([^"]+)"\."([^"]+)""#).unwrap());

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub extensions: BTreeSet<String>,
    pub schemas: BTreeSet<String>,
    /// (schema, table) -> constraint names
    pub tables: BTreeMap<(String, String), BTreeSet<String>>,
    pub indexes: BTreeSet<String>,
    /// (extension, hash) in insertion order
    pub migrations: Vec<(String, String)>,
    pub snapshots: Vec<String>,
    /// Every statement that changed something, in order
    pub applied: Vec<String>,
}

impl Catalog {
    pub fn has_table(&self, schema: &str, table: &str) -> bool {
        self.tables.contains_key(&(schema.to_string(), table.to_string()))
    }

    pub fn constraints(&self, schema: &str, table: &str) -> BTreeSet<String> {
        self.tables
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn created_tables(&self) -> Vec<String> {
        self.applied
            .iter()
            .filter_map(|sql| CREATE_TABLE.captures(sql).map(|c| c[2].to_string()))
            .collect()
    }
}

#[derive(Default)]
pub struct FakeExecutor {
    catalog: Mutex<Catalog>,
    failing_extensions: HashSet<String>,
    failing_tables: HashSet<String>,
    racing_constraints: Mutex<HashSet<String>>,
}

fn text_param(params: &[SqlValue], index: usize) -> String {
    match params.get(index) {
        Some(SqlValue::Text(Some(s))) => s.clone(),
        _ => String::new(),
    }
}

fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_extension(mut self, extension: &str) -> Self {
        self.failing_extensions.insert(extension.to_string());
        self
    }

    pub fn failing_table(mut self, table: &str) -> Self {
        self.failing_tables.insert(table.to_string());
        self
    }

    /// Pretend another process adds `name` between the catalog check and the ALTER
    pub fn racing_constraint(self, name: &str) -> Self {
        self.racing_constraints.lock().insert(name.to_string());
        self
    }

    /// Seed a table that already exists, with the given named constraints
    pub fn with_table(self, schema: &str, table: &str, constraints: &[&str]) -> Self {
        {
            let mut catalog = self.catalog.lock();
            catalog.schemas.insert(schema.to_string());
            catalog.tables.insert(
                (schema.to_string(), table.to_string()),
                constraints.iter().map(|c| c.to_string()).collect(),
            );
        }
        self
    }

    pub fn catalog(&self) -> Catalog {
        self.catalog.lock().clone()
    }

    fn apply(&self, catalog: &mut Catalog, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let sql = sql.trim();

        if let Some(c) = CREATE_EXTENSION.captures(sql) {
            if self.failing_extensions.contains(&c[1]) {
                return Err(StorageError::sql(
                    Some("42501"),
                    format!("permission denied to create extension \"{}\"", &c[1]),
                ));
            }
            catalog.extensions.insert(c[1].to_string());
        } else if let Some(c) = CREATE_SCHEMA.captures(sql) {
            catalog.schemas.insert(c[1].to_string());
        } else if let Some(c) = CREATE_TABLE.captures(sql) {
            if self.failing_tables.contains(&c[2]) {
                return Err(StorageError::sql(
                    Some("42501"),
                    format!("permission denied for schema {}", &c[1]),
                ));
            }
            let key = (c[1].to_string(), c[2].to_string());
            if catalog.tables.contains_key(&key) {
                return Ok(0);
            }
            let inline: BTreeSet<String> = INLINE_CONSTRAINT
                .captures_iter(sql)
                .map(|m| m[1].to_string())
                .collect();
            catalog.tables.insert(key, inline);
        } else if let Some(c) = CREATE_INDEX.captures(sql) {
            if !catalog.has_table(&c[2], &c[3]) {
                return Err(StorageError::sql(
                    Some("42P01"),
                    format!("relation \"{}.{}\" does not exist", &c[2], &c[3]),
                ));
            }
            catalog.indexes.insert(c[1].to_string());
        } else if let Some(c) = ADD_CONSTRAINT.captures(sql) {
            let (schema, table, name) = (c[1].to_string(), c[2].to_string(), c[3].to_string());
            if !catalog.has_table(&schema, &table) {
                return Err(StorageError::sql(
                    Some("42P01"),
                    format!("relation \"{schema}.{table}\" does not exist"),
                ));
            }
            if let Some(r) = REFERENCES.captures(sql) {
                if !catalog.has_table(&r[1], &r[2]) {
                    return Err(StorageError::sql(
                        Some("42P01"),
                        format!("relation \"{}.{}\" does not exist", &r[1], &r[2]),
                    ));
                }
            }
            let raced = self.racing_constraints.lock().remove(&name);
            let constraints = catalog.tables.entry((schema, table)).or_default();
            if raced {
                constraints.insert(name.clone());
            }
            if !constraints.insert(name.clone()) {
                return Err(StorageError::sql(
                    Some("42710"),
                    format!("constraint \"{name}\" for relation already exists"),
                ));
            }
        } else if sql.starts_with("INSERT INTO migrations._migrations") {
            catalog
                .migrations
                .push((text_param(params, 0), text_param(params, 1)));
        } else if sql.starts_with("INSERT INTO migrations._snapshots") {
            catalog.snapshots.push(text_param(params, 0));
        } else {
            return Ok(0);
        }

        catalog.applied.push(sql.to_string());
        Ok(1)
    }
}

#[async_trait]
impl SqlExecutor for FakeExecutor {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Server
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let mut catalog = self.catalog.lock();
        self.apply(&mut catalog, sql, params)
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let catalog = self.catalog.lock();

        if sql.contains("information_schema.tables") {
            let schema = text_param(params, 0);
            return Ok(catalog
                .tables
                .keys()
                .filter(|(s, _)| *s == schema)
                .map(|(_, t)| row(json!({ "table_name": t })))
                .collect());
        }
        if sql.contains("information_schema.table_constraints") {
            return Ok(catalog
                .constraints(&text_param(params, 0), &text_param(params, 1))
                .into_iter()
                .map(|c| row(json!({ "constraint_name": c })))
                .collect());
        }
        if sql.contains("information_schema.schemata") {
            return Ok(catalog
                .schemas
                .iter()
                .map(|s| row(json!({ "schema_name": s })))
                .collect());
        }
        if sql.contains("FROM migrations._migrations") {
            let extension = text_param(params, 0);
            return Ok(catalog
                .migrations
                .iter()
                .enumerate()
                .filter(|(_, (name, _))| *name == extension)
                .last()
                .map(|(id, (_, hash))| row(json!({ "id": id as i64 + 1, "hash": hash, "created_at": 0 })))
                .into_iter()
                .collect());
        }
        if sql.contains("FROM migrations._snapshots") {
            let extension = text_param(params, 0);
            let count = catalog.snapshots.iter().filter(|s| **s == extension).count();
            return Ok(vec![row(json!({ "count": count }))]);
        }
        Ok(Vec::new())
    }

    async fn transaction(&self, statements: &[Statement]) -> Result<()> {
        let mut catalog = self.catalog.lock();
        let mut working = catalog.clone();
        for statement in statements {
            self.apply(&mut working, &statement.sql, &statement.params)?;
        }
        *catalog = working;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Route `tracing` output through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
