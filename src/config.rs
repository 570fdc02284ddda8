//! Configuration for the persistence core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, StorageError};
use crate::retry::RetryConfig;

/// Default location of the embedded database
pub const DEFAULT_DATA_DIR: &str = "./.eliza/.elizadb";

/// Which engine a configuration points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// Server-based PostgreSQL reached over a connection string
    Server { url: String },
    /// Embedded engine persisted under a data directory
    Embedded { data_dir: PathBuf },
}

/// Configuration for database access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string; absent means embedded mode
    pub postgres_url: Option<String>,
    /// Data directory for the embedded engine
    pub data_dir: PathBuf,
    /// Pool size for the server engine
    pub max_connections: u32,
    /// Embedding dimension applied at `init`, if any
    pub embedding_dimension: Option<usize>,
    /// Retry policy wrapped around every storage operation
    pub retry: RetryConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_connections: 10,
            embedding_dimension: None,
            retry: RetryConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// Server-mode configuration for the given connection string
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            postgres_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Create a new config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("POSTGRES_URL") {
            if !val.trim().is_empty() {
                config.postgres_url = Some(val.trim().to_string());
            }
        }

        if let Ok(val) = std::env::var("PGLITE_DATA_DIR") {
            if !val.trim().is_empty() {
                config.data_dir = PathBuf::from(val.trim());
            }
        }

        if let Ok(val) = std::env::var("POSTGRES_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                config.max_connections = n;
            }
        }

        if let Ok(val) = std::env::var("EMBEDDING_DIMENSION") {
            if let Ok(n) = val.parse() {
                config.embedding_dimension = Some(n);
            }
        }

        if let Ok(val) = std::env::var("SQL_MAX_RETRIES") {
            if let Ok(n) = val.parse() {
                config.retry.max_attempts = n;
            }
        }

        if let Ok(val) = std::env::var("SQL_RETRY_BASE_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.retry.base_delay_ms = n;
            }
        }

        if let Ok(val) = std::env::var("SQL_RETRY_MAX_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.retry.max_delay_ms = n;
            }
        }

        if let Ok(val) = std::env::var("SQL_RETRY_JITTER_MS") {
            if let Ok(n) = val.parse() {
                config.retry.jitter_max_ms = n;
            }
        }

        config
    }

    /// Reject settings the connection and retry layers cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(StorageError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(StorageError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(StorageError::Config(format!(
                "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
                self.retry.max_delay_ms, self.retry.base_delay_ms
            )));
        }
        Ok(())
    }

    pub fn target(&self) -> ConnectionTarget {
        match &self.postgres_url {
            Some(url) => ConnectionTarget::Server { url: url.clone() },
            None => ConnectionTarget::Embedded {
                data_dir: self.data_dir.clone(),
            },
        }
    }
}
