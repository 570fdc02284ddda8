#![allow(missing_docs)]
//! Persistence core for elizaOS agents: runtime schema migrations plus memory
//! and vector storage over PostgreSQL (server) and PGLite (embedded).

pub mod adapter;
pub mod base;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod migration;
pub mod retry;
pub mod schema;
pub mod types;
pub mod vector;

#[cfg(feature = "native")]
pub mod postgres;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod pglite;

#[cfg(all(feature = "wasm", target_arch = "wasm32"))]
pub mod wasm;

pub use adapter::SqlDatabaseAdapter;
pub use base::DatabaseAdapter;
pub use config::DatabaseConfig;
pub use context::DatabaseContext;
pub use error::{Result, StorageError};
pub use executor::{DatabaseKind, SqlExecutor, SqlValue, Statement};
pub use migration::{ExtensionSchema, MigrationReport, RuntimeMigrator, TableDefinition};
