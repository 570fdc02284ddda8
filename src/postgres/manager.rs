#![allow(missing_docs)]
//! PostgreSQL connection manager for elizaOS

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row as _};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::{Result, StorageError};
use crate::executor::{json_rows_sql, DatabaseKind, Row, SqlExecutor, SqlValue, Statement};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::vector::to_pg_literal;

/// PostgreSQL connection manager
pub struct PostgresConnectionManager {
    pool: PgPool,
}

impl PostgresConnectionManager {
    /// Connect a pool of at most `max_connections`
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        info!(max_connections, "Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(connection_string)
            .await
            .map_err(|e| StorageError::from(e).context("connect to PostgreSQL"))?;

        info!("Connected to PostgreSQL successfully");

        Ok(PostgresConnectionManager { pool })
    }

    /// Connect using the config's URL, pool size and retry policy
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self> {
        let url = config
            .postgres_url
            .as_deref()
            .ok_or_else(|| StorageError::Config("POSTGRES_URL is not set".to_string()))?;
        Self::connect_with_retry(url, config.max_connections, &config.retry).await
    }

    pub async fn connect_with_retry(
        connection_string: &str,
        max_connections: u32,
        retry: &RetryConfig,
    ) -> Result<Self> {
        retry_with_backoff(
            || Self::new(connection_string, max_connections),
            retry,
            "connect to PostgreSQL",
        )
        .await
    }

    /// Get the connection pool
    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }

    /// Test the connection
    pub async fn test_connection(&self) -> Result<bool> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::from(e).context("connection test"))?;
        Ok(true)
    }
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Uuid(v) => query.bind(*v),
            SqlValue::Text(v) => query.bind(v.clone()),
            SqlValue::Bool(v) => query.bind(*v),
            SqlValue::Int(v) => query.bind(*v),
            SqlValue::Float(v) => query.bind(*v),
            SqlValue::Json(v) => query.bind(v.clone()),
            SqlValue::Timestamp(v) => query.bind(*v),
            SqlValue::UuidArray(v) => query.bind(v.clone()),
            SqlValue::TextArray(v) => query.bind(v.clone()),
            SqlValue::Vector(v) => query.bind(to_pg_literal(v)),
        };
    }
    query
}

#[async_trait]
impl SqlExecutor for PostgresConnectionManager {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Server
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
        let wrapped = json_rows_sql(sql);
        let rows = bind_params(sqlx::query(&wrapped), params)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let value: serde_json::Value = row.try_get("row")?;
                match value {
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
        let mut tx = self.pool.begin().await?;
        for statement in statements {
            bind_params(sqlx::query(&statement.sql), &statement.params)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!(statements = statements.len(), "Committed transaction");
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.test_connection().await.map(|_| ())
    }

    /// Close all connections
    async fn close(&self) -> Result<()> {
        debug!("Closing PostgreSQL connection pool");
        self.pool.close().await;
        info!("PostgreSQL connection pool closed");
        Ok(())
    }
}
