#![allow(missing_docs)]
//! Application context owning the connection managers.
//!
//! One executor per [`DatabaseKind`], built on first use and shared by every
//! adapter and migrator created from the context. Nothing here is global: the
//! host creates a context and passes it to whatever needs storage.

use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::adapter::SqlDatabaseAdapter;
use crate::config::{ConnectionTarget, DatabaseConfig};
use crate::error::{Result, StorageError};
use crate::executor::{DatabaseKind, SqlExecutor};
use crate::types::UUID;

pub struct DatabaseContext {
    config: DatabaseConfig,
    server: OnceCell<Arc<dyn SqlExecutor>>,
    embedded: OnceCell<Arc<dyn SqlExecutor>>,
}

impl DatabaseContext {
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(DatabaseContext {
            config,
            server: OnceCell::new(),
            embedded: OnceCell::new(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(DatabaseConfig::from_env())
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Kind selected by the configuration
    pub fn kind(&self) -> DatabaseKind {
        match self.config.target() {
            ConnectionTarget::Server { .. } => DatabaseKind::Server,
            ConnectionTarget::Embedded { .. } => DatabaseKind::Embedded,
        }
    }

    /// Hand over the embedded engine; only the first registration is kept
    pub fn register_embedded(&self, executor: Arc<dyn SqlExecutor>) -> Result<()> {
        self.embedded.set(executor).map_err(|_| {
            StorageError::Config("an embedded database is already registered".to_string())
        })?;
        debug!("Registered embedded database");
        Ok(())
    }

    /// The executor for the configured kind, connecting the server pool on first use
    pub async fn executor(&self) -> Result<Arc<dyn SqlExecutor>> {
        match self.config.target() {
            ConnectionTarget::Server { .. } => self.server_executor().await,
            ConnectionTarget::Embedded { data_dir } => self.embedded.get().cloned().ok_or_else(|| {
                StorageError::Config(format!(
                    "no embedded database registered for {}",
                    data_dir.display()
                ))
            }),
        }
    }

    #[cfg(feature = "native")]
    async fn server_executor(&self) -> Result<Arc<dyn SqlExecutor>> {
        let executor = self
            .server
            .get_or_try_init(|| async {
                let manager =
                    crate::postgres::PostgresConnectionManager::from_config(&self.config).await?;
                Ok::<_, StorageError>(Arc::new(manager) as Arc<dyn SqlExecutor>)
            })
            .await?;
        Ok(executor.clone())
    }

    #[cfg(not(feature = "native"))]
    async fn server_executor(&self) -> Result<Arc<dyn SqlExecutor>> {
        self.server.get().cloned().ok_or_else(|| {
            StorageError::Config("server mode requires the `native` feature".to_string())
        })
    }

    /// Adapter for one agent over the configured executor
    pub async fn adapter(&self, agent_id: UUID) -> Result<SqlDatabaseAdapter> {
        let executor = self.executor().await?;
        Ok(SqlDatabaseAdapter::new(executor, agent_id, &self.config))
    }

    /// Close whichever executors were built
    pub async fn close(&self) -> Result<()> {
        for executor in [self.server.get(), self.embedded.get()].into_iter().flatten() {
            executor.close().await?;
        }
        info!("Database context closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Row, SqlValue, Statement};
    use async_trait::async_trait;

    struct NullExecutor;

    #[async_trait]
    impl SqlExecutor for NullExecutor {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Embedded
        }
        async fn execute(&self, _sql: &str, _params: &[SqlValue]) -> Result<u64> {
            Ok(0)
        }
        async fn fetch_all(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>> {
            Ok(Vec::new())
        }
        async fn transaction(&self, _statements: &[Statement]) -> Result<()> {
            Ok(())
        }
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_embedded_requires_registration() {
        let context = DatabaseContext::new(DatabaseConfig::default()).unwrap();
        assert_eq!(context.kind(), DatabaseKind::Embedded);
        assert!(matches!(context.executor().await, Err(StorageError::Config(_))));

        context.register_embedded(Arc::new(NullExecutor)).unwrap();
        let executor = context.executor().await.unwrap();
        assert_eq!(executor.kind(), DatabaseKind::Embedded);

        assert!(context.register_embedded(Arc::new(NullExecutor)).is_err());
        context.close().await.unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = DatabaseConfig::default();
        config.max_connections = 0;
        assert!(DatabaseContext::new(config).is_err());
    }
}
