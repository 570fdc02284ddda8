#![allow(missing_docs)]
//! Error types for the persistence core.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, StorageError>;

/// SQLSTATE codes the engine treats as "object already exists"
const ALREADY_EXISTS_CODES: &[&str] = &["42710", "42P07", "42P06"];

/// Errors raised by the migration engine and the storage layer
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection-level failure (pool exhausted, socket closed, TLS, ...)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Error reported by the database engine
    #[error("SQL error{}: {message}", .code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Sql {
        code: Option<String>,
        message: String,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid descriptor for table '{table}': {reason}")]
    InvalidDescriptor { table: String, reason: String },

    /// Phase-1 failure; aborts the migration run for the extension
    #[error("Failed to create table '{table}' for extension '{extension}': {source}")]
    TableCreation {
        extension: String,
        table: String,
        #[source]
        source: Box<StorageError>,
    },

    #[error(
        "Embedding dimension mismatch: agent already stores {existing}-dimension embeddings, refusing {requested}"
    )]
    DimensionMismatch { existing: usize, requested: usize },

    #[error("Unsupported embedding dimension: {0}")]
    UnsupportedDimension(usize),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{operation} failed: {source}")]
    Context {
        operation: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn sql(code: Option<&str>, message: impl Into<String>) -> Self {
        StorageError::Sql {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Wrap with the name of the operation that failed
    pub fn context(self, operation: impl Into<String>) -> Self {
        StorageError::Context {
            operation: operation.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping `Context` wrappers
    pub fn root(&self) -> &StorageError {
        match self {
            StorageError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// SQLSTATE of the underlying engine error, if any
    pub fn code(&self) -> Option<&str> {
        match self.root() {
            StorageError::Sql { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the retry layer may attempt the operation again
    pub fn is_transient(&self) -> bool {
        match self.root() {
            StorageError::Connection(_) => true,
            StorageError::Sql {
                code: Some(code), ..
            } => {
                code.starts_with("08")
                    || code.starts_with("53")
                    || code.starts_with("57P")
                    || code == "40001"
                    || code == "40P01"
            }
            _ => false,
        }
    }

    /// Whether the engine rejected a DDL statement because the object exists
    pub fn is_already_exists(&self) -> bool {
        match self.root() {
            StorageError::Sql { code, message } => {
                code.as_deref()
                    .is_some_and(|c| ALREADY_EXISTS_CODES.contains(&c))
                    || message.to_lowercase().contains("already exists")
            }
            _ => false,
        }
    }
}

#[cfg(feature = "native")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StorageError::Sql {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => StorageError::Connection(err.to_string()),
            other => StorageError::Sql {
                code: None,
                message: other.to_string(),
            },
        }
    }
}
