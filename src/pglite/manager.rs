#![allow(missing_docs)]
//! PGLite connection manager for elizaOS WASM environments
//!
//! The PGLite instance is created by the JavaScript host and handed over as a
//! `JsValue`. Parameters cross the boundary in PostgreSQL text form and rows
//! come back through `JSON.stringify`, so they decode exactly like server rows.

#![cfg(all(feature = "wasm", target_arch = "wasm32"))]

use async_trait::async_trait;
use js_sys::{Array, Promise, Reflect, JSON};
use tracing::{debug, info, warn};
use wasm_bindgen::JsCast;
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::error::{Result, StorageError};
use crate::executor::{json_rows_sql, DatabaseKind, Row, SqlExecutor, SqlValue, Statement};
use crate::vector::to_pg_literal;

/// PGLite connection manager for WASM
pub struct PgLiteManager {
    /// The PGLite instance (JavaScript object)
    pglite: JsValue,
}

// In wasm32 we are single-threaded; JS values are safe to access within the same thread.
// We mark the wrapper as Send/Sync so it can satisfy the `SqlExecutor: Send + Sync` bound.
unsafe impl Send for PgLiteManager {}
unsafe impl Sync for PgLiteManager {}

fn js_error(context: &str, err: JsValue) -> StorageError {
    let code = Reflect::get(&err, &JsValue::from_str("code"))
        .ok()
        .and_then(|c| c.as_string());
    let message = Reflect::get(&err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{err:?}"));
    StorageError::sql(code.as_deref(), format!("{context}: {message}"))
}

/// `{"a","b"}` with quotes and backslashes escaped
fn array_literal<T: ToString>(items: &[T]) -> String {
    let quoted: Vec<String> = items
        .iter()
        .map(|item| {
            let escaped = item.to_string().replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\"")
        })
        .collect();
    format!("{{{}}}", quoted.join(","))
}

fn to_js(value: &SqlValue) -> Result<JsValue> {
    fn text_or_null<T: ToString>(v: &Option<T>) -> JsValue {
        v.as_ref()
            .map_or(JsValue::NULL, |v| JsValue::from_str(&v.to_string()))
    }

    Ok(match value {
        SqlValue::Uuid(v) => text_or_null(v),
        SqlValue::Text(v) => text_or_null(v),
        SqlValue::Bool(v) => v.map_or(JsValue::NULL, JsValue::from_bool),
        SqlValue::Int(v) => v.map_or(JsValue::NULL, |n| JsValue::from_str(&n.to_string())),
        SqlValue::Float(v) => v.map_or(JsValue::NULL, JsValue::from_f64),
        SqlValue::Json(v) => match v {
            Some(json) => JsValue::from_str(&serde_json::to_string(json)?),
            None => JsValue::NULL,
        },
        SqlValue::Timestamp(v) => v.map_or(JsValue::NULL, |t| JsValue::from_str(&t.to_rfc3339())),
        SqlValue::UuidArray(v) => JsValue::from_str(&array_literal(v)),
        SqlValue::TextArray(v) => JsValue::from_str(&array_literal(v)),
        SqlValue::Vector(v) => JsValue::from_str(&to_pg_literal(v)),
    })
}

impl PgLiteManager {
    /// Wrap a PGLite instance created by the host
    pub fn new(pglite: JsValue) -> Result<Self> {
        if pglite.is_undefined() || pglite.is_null() {
            return Err(StorageError::Config("PGLite instance is missing".to_string()));
        }
        info!("PGLite initialized successfully");
        Ok(PgLiteManager { pglite })
    }

    fn method(&self, name: &str) -> Result<js_sys::Function> {
        Reflect::get(&self.pglite, &JsValue::from_str(name))
            .map_err(|e| js_error(&format!("Failed to get {name} method"), e))?
            .dyn_into()
            .map_err(|e| js_error(&format!("PGlite.{name} is not a function"), e))
    }

    /// Execute a query and return the PGLite results object
    pub async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<JsValue> {
        let params_array = Array::new();
        for param in params {
            params_array.push(&to_js(param)?);
        }

        let promise = self
            .method("query")?
            .apply(&self.pglite, &Array::of2(&JsValue::from_str(sql), &params_array))
            .map_err(|e| js_error("Failed to call query", e))?;

        JsFuture::from(Promise::from(promise))
            .await
            .map_err(|e| js_error("Query failed", e))
    }

    /// Execute SQL without returning results
    pub async fn exec(&self, sql: &str) -> Result<()> {
        let promise = self
            .method("exec")?
            .apply(&self.pglite, &Array::of1(&JsValue::from_str(sql)))
            .map_err(|e| js_error("Failed to call exec", e))?;

        JsFuture::from(Promise::from(promise))
            .await
            .map_err(|e| js_error("Exec failed", e))?;
        Ok(())
    }

    async fn run_batch(&self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.query(&statement.sql, &statement.params).await?;
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl SqlExecutor for PgLiteManager {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Embedded
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = self.query(sql, params).await?;
        let affected = Reflect::get(&result, &JsValue::from_str("affectedRows"))
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);
        Ok(affected as u64)
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let result = self.query(&json_rows_sql(sql), params).await?;
        let rows: Array = Reflect::get(&result, &JsValue::from_str("rows"))
            .map_err(|e| js_error("Query result has no rows", e))?
            .dyn_into()
            .map_err(|e| js_error("Query rows are not an array", e))?;

        rows.iter()
            .map(|row| {
                let value = Reflect::get(&row, &JsValue::from_str("row"))
                    .map_err(|e| js_error("Row has no row column", e))?;
                let text = JSON::stringify(&value)
                    .map_err(|e| js_error("Failed to stringify row", e))?
                    .as_string()
                    .unwrap_or_default();
                match serde_json::from_str(&text)? {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(StorageError::sql(
                        None,
                        format!("expected a JSON object row, got {other}"),
                    )),
                }
            })
            .collect()
    }

    async fn transaction(&self, statements: &[Statement]) -> Result<()> {
        self.exec("BEGIN").await?;
        match self.run_batch(statements).await {
            Ok(()) => {
                self.exec("COMMIT").await?;
                debug!(statements = statements.len(), "Committed transaction");
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.exec("ROLLBACK").await {
                    warn!(error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    /// Close the database connection
    async fn close(&self) -> Result<()> {
        let promise = self
            .method("close")?
            .apply(&self.pglite, &Array::new())
            .map_err(|e| js_error("Failed to call close", e))?;

        JsFuture::from(Promise::from(promise))
            .await
            .map_err(|e| js_error("Close failed", e))?;

        debug!("PGLite connection closed");
        Ok(())
    }
}
