#![allow(missing_docs)]
//! PGLite engine for elizaOS
//!
//! The embedded [`SqlExecutor`](crate::executor::SqlExecutor) for WASM hosts.

mod manager;

pub use manager::PgLiteManager;
