#![allow(missing_docs)]
//! The SQL surface shared by the server and embedded engines.
//!
//! Both engines speak the PostgreSQL dialect. Rows come back as JSON objects
//! keyed by column name (see [`json_rows_sql`]) so records decode the same way
//! no matter which engine produced them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::Result;
use crate::types::UUID;

/// A result row
pub type Row = serde_json::Map<String, Value>;

/// Database kinds, one connection manager each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    /// PostgreSQL over a connection string
    Server,
    /// PGLite living in the host process
    Embedded,
}

/// A bind parameter.
///
/// Every variant carries its SQL type, including NULLs, so parameters bind
/// correctly against typed columns.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Uuid(Option<UUID>),
    Text(Option<String>),
    Bool(Option<bool>),
    Int(Option<i64>),
    Float(Option<f64>),
    Json(Option<Value>),
    Timestamp(Option<DateTime<Utc>>),
    UuidArray(Vec<UUID>),
    TextArray(Vec<String>),
    /// Bound as a pgvector text literal; the statement must cast it (`$n::vector`)
    Vector(Vec<f32>),
}

impl From<UUID> for SqlValue {
    fn from(v: UUID) -> Self {
        SqlValue::Uuid(Some(v))
    }
}

impl From<Option<UUID>> for SqlValue {
    fn from(v: Option<UUID>) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(Some(v.to_string()))
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(Some(v))
    }
}

impl From<Option<String>> for SqlValue {
    fn from(v: Option<String>) -> Self {
        SqlValue::Text(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(Some(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(Some(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(Some(v))
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        SqlValue::Json(Some(v))
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(Some(v))
    }
}

impl From<Vec<UUID>> for SqlValue {
    fn from(v: Vec<UUID>) -> Self {
        SqlValue::UuidArray(v)
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(v)
    }
}

/// One statement of a transactional batch
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }
}

/// Engine connection used by the migration engine and the storage layer.
///
/// Implementations own the pool/connection; callers only borrow it.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait SqlExecutor: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    /// Run a statement, returning the number of affected rows
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run a query and return every row as a JSON object
    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>>;

    async fn fetch_optional(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    /// Run all statements in one transaction; nothing is kept if any fails
    async fn transaction(&self, statements: &[Statement]) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Wrap a query (SELECT or data-modifying with RETURNING) so each row comes back
/// as a single JSONB column named `row`.
pub fn json_rows_sql(sql: &str) -> String {
    format!(
        "WITH q AS ({}) SELECT to_jsonb(q) AS row FROM q",
        sql.trim().trim_end_matches(';')
    )
}

pub fn decode_row<T: DeserializeOwned>(row: Row) -> Result<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}
