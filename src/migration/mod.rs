#![allow(missing_docs)]
//! Runtime schema migrations for extension-declared tables.
//!
//! Extensions describe their tables as [`TableDefinition`]s (or as JSON
//! descriptors run through the [`introspector`]). The [`RuntimeMigrator`]
//! places each extension in its own schema and brings the database up to date
//! without hand-written migration scripts.
//!
//! # Features
//!
//! - Per-extension schema namespacing
//! - Dependency-ordered table creation
//! - Two-phase constraint application, idempotent across runs
//! - Migration history and snapshot tracking

pub mod ddl;
pub mod definition;
pub mod introspector;
pub mod migrator;
pub mod resolver;
pub mod schema_namespace;
pub mod tracker;

pub use definition::{
    CheckConstraint, ColumnDefault, ColumnDefinition, CompositePrimaryKey, ExtensionSchema,
    ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType, TableDefinition,
    UniqueConstraint,
};
pub use migrator::{MigrationReport, RuntimeMigrator, REQUIRED_EXTENSIONS};
pub use resolver::resolve_creation_order;
pub use schema_namespace::{derive_schema_name, SchemaNamespaceManager, CORE_EXTENSION_NAME};
pub use tracker::{schema_hash, MigrationRecord, MigrationStatus, MigrationTracker};
