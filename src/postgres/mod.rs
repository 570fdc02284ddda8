#![allow(missing_docs)]
//! PostgreSQL engine for elizaOS
//!
//! A pooled [`SqlExecutor`](crate::executor::SqlExecutor) over `sqlx`.

mod manager;

pub use manager::PostgresConnectionManager;
