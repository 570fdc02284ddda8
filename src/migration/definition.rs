#![allow(missing_docs)]
//! Declarative table definitions.
//!
//! A [`TableDefinition`] is the engine-neutral description of one table. Extensions
//! either build them directly with the builder methods below or have them
//! produced from loosely structured descriptors by the introspector.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Postgres identifiers are truncated past this length
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Version of the definition format, recorded with migration snapshots
pub const DEFINITION_FORMAT_VERSION: u32 = 1;

/// Column types understood by the DDL generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Uuid,
    Text,
    VarChar(Option<u32>),
    Integer,
    BigInt,
    Serial,
    Boolean,
    Real,
    DoublePrecision,
    Numeric,
    Timestamp,
    TimestampTz,
    Json,
    Jsonb,
    /// pgvector column of a fixed dimension
    Vector(usize),
    Array(Box<SqlType>),
    /// Passed through verbatim
    Custom(String),
}

impl SqlType {
    pub fn is_json(&self) -> bool {
        matches!(self, SqlType::Json | SqlType::Jsonb)
    }

    /// Types whose literals are written without quotes
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlType::Integer
                | SqlType::BigInt
                | SqlType::Serial
                | SqlType::Real
                | SqlType::DoublePrecision
                | SqlType::Numeric
        )
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Uuid => write!(f, "UUID"),
            SqlType::Text => write!(f, "TEXT"),
            SqlType::VarChar(Some(len)) => write!(f, "VARCHAR({len})"),
            SqlType::VarChar(None) => write!(f, "VARCHAR"),
            SqlType::Integer => write!(f, "INTEGER"),
            SqlType::BigInt => write!(f, "BIGINT"),
            SqlType::Serial => write!(f, "SERIAL"),
            SqlType::Boolean => write!(f, "BOOLEAN"),
            SqlType::Real => write!(f, "REAL"),
            SqlType::DoublePrecision => write!(f, "DOUBLE PRECISION"),
            SqlType::Numeric => write!(f, "NUMERIC"),
            SqlType::Timestamp => write!(f, "TIMESTAMP"),
            SqlType::TimestampTz => write!(f, "TIMESTAMPTZ"),
            SqlType::Json => write!(f, "JSON"),
            SqlType::Jsonb => write!(f, "JSONB"),
            SqlType::Vector(dim) => write!(f, "vector({dim})"),
            SqlType::Array(inner) => write!(f, "{inner}[]"),
            SqlType::Custom(raw) => write!(f, "{raw}"),
        }
    }
}

/// Column default value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    /// SQL expression emitted bare, e.g. `now()` or `gen_random_uuid()`
    Expression(String),
    /// Literal formatted according to the column type
    Literal(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub sql_type: SqlType,
    pub not_null: bool,
    pub unique: bool,
    pub primary_key: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: SqlType) -> Self {
        ColumnDefinition {
            name: name.into(),
            sql_type,
            not_null: false,
            unique: false,
            primary_key: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Primary keys are implicitly NOT NULL
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.not_null = true;
        self
    }

    pub fn default_sql(mut self, expression: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expression(expression.into()));
        self
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default = Some(ColumnDefault::Literal(value));
        self
    }
}

/// `ON DELETE` / `ON UPDATE` behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }

    /// Parse the spellings descriptors use (`cascade`, `set null`, `SET_NULL`, ...)
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "cascade" => Some(ReferentialAction::Cascade),
            "set null" => Some(ReferentialAction::SetNull),
            "set default" => Some(ReferentialAction::SetDefault),
            "restrict" => Some(ReferentialAction::Restrict),
            "no action" => Some(ReferentialAction::NoAction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    /// Filled in from the owning table when left empty
    pub name: String,
    pub columns: Vec<String>,
    pub foreign_table: String,
    /// Namespace of the referenced table when it lives outside the migrating extension
    pub foreign_schema: Option<String>,
    pub foreign_columns: Vec<String>,
    pub on_delete: Option<ReferentialAction>,
    pub on_update: Option<ReferentialAction>,
}

impl ForeignKeyDefinition {
    pub fn new<C, F>(columns: C, foreign_table: impl Into<String>, foreign_columns: F) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        ForeignKeyDefinition {
            name: String::new(),
            columns: columns.into_iter().map(Into::into).collect(),
            foreign_table: foreign_table.into(),
            foreign_schema: None,
            foreign_columns: foreign_columns.into_iter().map(Into::into).collect(),
            on_delete: None,
            on_update: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.foreign_schema = Some(schema.into());
        self
    }

    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = Some(action);
        self
    }

    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = Some(action);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    /// Column names or parenthesised expressions, e.g. `(metadata->>'type')`
    pub expressions: Vec<String>,
    pub unique: bool,
    /// Access method such as `hnsw` or `gin`
    pub method: Option<String>,
}

impl IndexDefinition {
    pub fn new<E>(name: impl Into<String>, expressions: E) -> Self
    where
        E: IntoIterator,
        E::Item: Into<String>,
    {
        IndexDefinition {
            name: name.into(),
            expressions: expressions.into_iter().map(Into::into).collect(),
            unique: false,
            method: None,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueConstraint {
    pub name: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConstraint {
    pub name: String,
    pub expression: String,
}

impl CheckConstraint {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        CheckConstraint {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositePrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
}

/// Engine-neutral description of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub foreign_keys: Vec<ForeignKeyDefinition>,
    pub unique_constraints: Vec<UniqueConstraint>,
    pub check_constraints: Vec<CheckConstraint>,
    pub composite_primary_key: Option<CompositePrimaryKey>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        TableDefinition {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
            check_constraints: Vec::new(),
            composite_primary_key: None,
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(mut self, mut fk: ForeignKeyDefinition) -> Self {
        if fk.name.is_empty() {
            fk.name = constraint_name(&[
                self.name.as_str(),
                &fk.columns.join("_"),
                &fk.foreign_table,
                &fk.foreign_columns.join("_"),
                "fk",
            ]);
        }
        self.foreign_keys.push(fk);
        self
    }

    pub fn index(mut self, index: IndexDefinition) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn unique<C>(mut self, name: Option<&str>, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = match name {
            Some(name) => name.to_string(),
            None => constraint_name(&[self.name.as_str(), &columns.join("_"), "unique"]),
        };
        self.unique_constraints.push(UniqueConstraint { name, columns });
        self
    }

    pub fn check(mut self, check: CheckConstraint) -> Self {
        self.check_constraints.push(check);
        self
    }

    /// Declare a multi-column primary key; single-column PK flags are then ignored
    pub fn primary_key<C>(mut self, columns: C) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let name = constraint_name(&[self.name.as_str(), &columns.join("_"), "pk"]);
        self.composite_primary_key = Some(CompositePrimaryKey { name, columns });
        self
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Tables this one references, self-references excluded, in declaration order
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for fk in &self.foreign_keys {
            if fk.foreign_table != self.name && !deps.contains(&fk.foreign_table) {
                deps.push(fk.foreign_table.clone());
            }
        }
        deps
    }
}

/// The set of tables one extension declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionSchema {
    /// Extension name, e.g. `@acme/plugin-orders`
    pub name: String,
    pub tables: Vec<TableDefinition>,
}

impl ExtensionSchema {
    pub fn new(name: impl Into<String>) -> Self {
        ExtensionSchema {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get_table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Build from JSON table descriptors keyed by export name
    pub fn from_descriptors(
        name: impl Into<String>,
        exports: &serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        super::introspector::introspect_extension(&name.into(), exports)
    }
}

/// Join parts with `_`, truncated to the identifier limit on a char boundary
pub fn constraint_name(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_");
    truncate_identifier(&joined)
}

pub fn truncate_identifier(name: &str) -> String {
    name.chars().take(MAX_IDENTIFIER_LENGTH).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn orders() -> TableDefinition {
        TableDefinition::new("orders")
            .column(ColumnDefinition::new("id", SqlType::Uuid).primary_key())
            .column(ColumnDefinition::new("customer_id", SqlType::Uuid).not_null())
            .column(ColumnDefinition::new("parent_id", SqlType::Uuid))
            .foreign_key(ForeignKeyDefinition::new(["customer_id"], "customers", ["id"]))
            .foreign_key(ForeignKeyDefinition::new(["parent_id"], "orders", ["id"]))
    }

    #[test]
    fn test_foreign_keys_get_default_names() {
        let table = orders();
        assert_eq!(table.foreign_keys[0].name, "orders_customer_id_customers_id_fk");
    }

    #[test]
    fn test_dependencies_skip_self_references() {
        assert_eq!(orders().dependencies(), vec!["customers".to_string()]);
    }

    #[test]
    fn test_composite_primary_key_name() {
        let table = TableDefinition::new("cache").primary_key(["key", "agent_id"]);
        let pk = table.composite_primary_key.unwrap();
        assert_eq!(pk.name, "cache_key_agent_id_pk");
        assert_eq!(pk.columns, vec!["key", "agent_id"]);
    }

    #[test]
    fn test_constraint_names_are_truncated() {
        let long = "x".repeat(80);
        assert_eq!(constraint_name(&[&long, "fk"]).len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_sql_type_display() {
        assert_eq!(SqlType::Vector(768).to_string(), "vector(768)");
        assert_eq!(SqlType::Array(Box::new(SqlType::Text)).to_string(), "TEXT[]");
        assert_eq!(SqlType::VarChar(Some(255)).to_string(), "VARCHAR(255)");
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!(ReferentialAction::parse("cascade"), Some(ReferentialAction::Cascade));
        assert_eq!(ReferentialAction::parse("SET_NULL"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("set null"), Some(ReferentialAction::SetNull));
        assert_eq!(ReferentialAction::parse("explode"), None);
    }
}
