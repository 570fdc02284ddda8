#![allow(missing_docs)]
//! Table definitions from loosely structured JSON descriptors.
//!
//! Extensions that cannot build [`TableDefinition`]s directly may ship their
//! tables as JSON, keyed by export name. Descriptors differ in how much
//! structure they carry, so every lookup here has fallbacks:
//!
//! - table name: `name`, then the `$declaredName` marker, then `$originalName`,
//!   then the export identifier (`userProfilesTable` becomes `user_profiles`)
//! - columns: the structured `columns` object/array, else any property shaped
//!   like a column (carries `type`, `dataType` or `columnType`)
//! - constraints: `extraConfig` builders (array or map) whose `$config` marker
//!   holds a name and a column list
//!
//! Anything that cannot be resolved (an FK whose target has no usable name, a
//! constraint without columns) is dropped with a warning. Nothing here touches
//! the database.
//!
//! ```json
//! {
//!   "$declaredName": "orders",
//!   "id": { "type": "uuid", "primaryKey": true, "default": "gen_random_uuid()" },
//!   "customerId": { "name": "customer_id", "type": "uuid", "notNull": true,
//!                   "references": { "table": "customers", "column": "id", "onDelete": "cascade" } },
//!   "extraConfig": [ { "kind": "index", "$config": { "name": "idx_orders_customer", "columns": ["customer_id"] } } ]
//! }
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

use super::ddl::is_sql_function_default;
use super::definition::{
    CheckConstraint, ColumnDefault, ColumnDefinition, CompositePrimaryKey, ExtensionSchema,
    ForeignKeyDefinition, IndexDefinition, ReferentialAction, SqlType, TableDefinition,
    UniqueConstraint,
};
use crate::error::{Result, StorageError};

pub const DECLARED_NAME_MARKER: &str = "$declaredName";
pub const ORIGINAL_NAME_MARKER: &str = "$originalName";
/// Key under which constraint builders keep their name and columns
pub const CONFIG_MARKER: &str = "$config";

/// Tables whose composite key is known to be missing from some descriptors
const COMPOSITE_KEY_OVERRIDES: &[(&str, &[&str])] = &[("cache", &["key", "agent_id"])];

/// Properties that describe the table when they do not hold a column definition
const STRUCTURAL_KEYS: &[&str] = &[
    "name",
    "columns",
    "foreignKeys",
    "indexes",
    "checks",
    "uniqueConstraints",
    "primaryKey",
    "extraConfig",
];

/// Guards against descriptors that nest references in themselves
const MAX_REFERENCE_DEPTH: usize = 4;

static DIM_COLUMN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^dim(\d+)$").expect("valid dim regex"));
static ACRONYM_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("valid acronym regex"));
static WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid boundary regex"));

/// `userProfiles` -> `user_profiles`, `HTTPLogs` -> `http_logs`
pub fn to_snake_case(name: &str) -> String {
    let step = ACRONYM_BOUNDARY.replace_all(name, "${1}_${2}");
    WORD_BOUNDARY
        .replace_all(&step, "${1}_${2}")
        .replace('-', "_")
        .to_lowercase()
}

/// Table name derived from an export identifier
pub fn derive_table_name(export_name: &str) -> String {
    let stem = match export_name.strip_suffix("Table") {
        Some(stem) if !stem.is_empty() => stem,
        _ => export_name,
    };
    to_snake_case(stem)
}

fn non_empty_str<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Resolve a descriptor's table name; `None` only when no marker is present and no export name is known
pub fn resolve_table_name(export_name: Option<&str>, descriptor: &Value) -> Option<String> {
    for key in ["name", DECLARED_NAME_MARKER, ORIGINAL_NAME_MARKER] {
        if let Some(name) = non_empty_str(descriptor.get(key)) {
            return Some(name.to_string());
        }
    }
    export_name.map(derive_table_name)
}

fn is_column_like(value: &Value) -> bool {
    ["type", "dataType", "columnType"]
        .iter()
        .any(|k| non_empty_str(value.get(*k)).is_some())
}

/// A top-level property picked up by the column scan.
///
/// Structural keys such as `name` or `primaryKey` are columns too when they
/// hold a plain column definition; one carrying a column list is table structure.
fn is_scanned_column(key: &str, value: &Value) -> bool {
    if key.starts_with('$') || !is_column_like(value) {
        return false;
    }
    !STRUCTURAL_KEYS.contains(&key) || value.get("columns").is_none()
}

/// Whether an export looks like a table at all
pub fn is_table_descriptor(descriptor: &Value) -> bool {
    let Some(obj) = descriptor.as_object() else {
        return false;
    };
    if matches!(obj.get("columns"), Some(Value::Object(_)) | Some(Value::Array(_))) {
        return true;
    }
    obj.iter().any(|(key, value)| is_scanned_column(key, value))
}

/// Introspect every table-shaped export of an extension.
///
/// Malformed tables are skipped with a warning.
pub fn introspect_extension(name: &str, exports: &Map<String, Value>) -> ExtensionSchema {
    let known: HashSet<String> = exports
        .iter()
        .filter(|(_, descriptor)| is_table_descriptor(descriptor))
        .filter_map(|(export, descriptor)| resolve_table_name(Some(export), descriptor))
        .collect();

    let mut schema = ExtensionSchema::new(name);
    for (export, descriptor) in exports {
        if !is_table_descriptor(descriptor) {
            debug!(extension = name, export = export.as_str(), "Skipping non-table export");
            continue;
        }
        match introspect_with_known(export, descriptor, &known) {
            Ok(table) => schema.tables.push(table),
            Err(e) => warn!(extension = name, export = export.as_str(), error = %e, "Skipping malformed table descriptor"),
        }
    }
    schema
}

/// Introspect a single descriptor exported as `export_name`
pub fn introspect_table(export_name: &str, descriptor: &Value) -> Result<TableDefinition> {
    introspect_with_known(export_name, descriptor, &HashSet::new())
}

fn introspect_with_known(
    export_name: &str,
    descriptor: &Value,
    known: &HashSet<String>,
) -> Result<TableDefinition> {
    let table_name = resolve_table_name(Some(export_name), descriptor)
        .unwrap_or_else(|| derive_table_name(export_name));
    let obj = descriptor
        .as_object()
        .ok_or_else(|| invalid(&table_name, "descriptor is not an object"))?;

    let mut table = TableDefinition::new(table_name.clone());
    let mut pending_fks: Vec<ForeignKeyDefinition> = Vec::new();

    for (key, raw) in column_entries(obj) {
        let column = parse_column(&table_name, key, raw)?;
        if let Some(reference) = raw.get("references") {
            if let Some(fk) = parse_foreign_key(&table_name, reference, known, Some(column.name.as_str())) {
                pending_fks.push(fk);
            }
        }
        table.columns.push(column);
    }

    if table.columns.is_empty() {
        return Err(invalid(&table_name, "no columns found"));
    }

    if let Some(Value::Array(fks)) = obj.get("foreignKeys") {
        for raw in fks {
            if let Some(fk) = parse_foreign_key(&table_name, raw, known, None) {
                pending_fks.push(fk);
            }
        }
    }

    if let Some(pk) = obj.get("primaryKey").and_then(|v| parse_named_columns(&table_name, v, "pk")) {
        table.composite_primary_key = Some(CompositePrimaryKey {
            name: pk.0,
            columns: pk.1,
        });
    }

    for (key, builder_key) in [("uniqueConstraints", "unique"), ("indexes", "index"), ("checks", "check")] {
        if let Some(Value::Array(entries)) = obj.get(key) {
            for entry in entries {
                apply_constraint(&mut table, builder_key, entry, known, &mut pending_fks);
            }
        }
    }

    for builder in extra_config_builders(obj.get("extraConfig")) {
        let kind = non_empty_str(builder.get("kind")).unwrap_or("primaryKey");
        match builder.get(CONFIG_MARKER) {
            Some(config) => apply_constraint(&mut table, kind, config, known, &mut pending_fks),
            None => warn!(table = table_name.as_str(), kind, "Constraint builder without config marker; ignoring"),
        }
    }

    apply_composite_key_override(&mut table);
    collapse_single_column_key(&mut table);

    for fk in pending_fks {
        table = table.foreign_key(fk);
    }
    Ok(table)
}

fn invalid(table: &str, reason: &str) -> StorageError {
    StorageError::InvalidDescriptor {
        table: table.to_string(),
        reason: reason.to_string(),
    }
}

fn column_entries(obj: &Map<String, Value>) -> Vec<(&str, &Value)> {
    match obj.get("columns") {
        Some(Value::Object(columns)) => columns.iter().map(|(k, v)| (k.as_str(), v)).collect(),
        Some(Value::Array(columns)) => columns
            .iter()
            .filter_map(|c| non_empty_str(c.get("name")).map(|n| (n, c)))
            .collect(),
        _ => obj
            .iter()
            .filter(|(key, value)| is_scanned_column(key, value))
            .map(|(k, v)| (k.as_str(), v))
            .collect(),
    }
}

fn flag(raw: &Value, keys: &[&str]) -> bool {
    keys.iter().any(|k| raw.get(*k).and_then(Value::as_bool) == Some(true))
}

fn parse_column(table: &str, key: &str, raw: &Value) -> Result<ColumnDefinition> {
    let name = non_empty_str(raw.get("name"))
        .map(str::to_string)
        .unwrap_or_else(|| to_snake_case(key));

    let sql_type = match DIM_COLUMN.captures(&name).and_then(|c| c[1].parse::<usize>().ok()) {
        Some(dimension) => SqlType::Vector(dimension),
        None => column_type(table, &name, raw)?,
    };

    let mut column = ColumnDefinition::new(name, sql_type);
    column.primary_key = flag(raw, &["primaryKey", "primary"]);
    column.not_null = column.primary_key
        || flag(raw, &["notNull"])
        || raw.get("nullable").and_then(Value::as_bool) == Some(false);
    column.unique = flag(raw, &["unique", "isUnique"]);

    let has_default = raw.get("hasDefault").and_then(Value::as_bool) != Some(false);
    if has_default {
        column.default = raw.get("default").map(classify_default);
    }
    Ok(column)
}

fn column_type(table: &str, column: &str, raw: &Value) -> Result<SqlType> {
    let base = if let Some(tag) = non_empty_str(raw.get("type")).or_else(|| non_empty_str(raw.get("columnType"))) {
        type_from_tag(table, column, tag, raw)?
    } else {
        match non_empty_str(raw.get("dataType")).unwrap_or("string") {
            "number" => SqlType::Integer,
            "bigint" => SqlType::BigInt,
            "boolean" => SqlType::Boolean,
            "json" => SqlType::Jsonb,
            "date" => SqlType::TimestampTz,
            "array" => SqlType::Array(Box::new(SqlType::Text)),
            "buffer" => SqlType::Custom("BYTEA".to_string()),
            _ => SqlType::Text,
        }
    };

    if flag(raw, &["isArray", "array"]) && !matches!(base, SqlType::Array(_)) {
        return Ok(SqlType::Array(Box::new(base)));
    }
    Ok(base)
}

fn type_from_tag(table: &str, column: &str, tag: &str, raw: &Value) -> Result<SqlType> {
    let tag = tag.trim().to_lowercase();
    if let Some(inner) = tag.strip_suffix("[]") {
        return Ok(SqlType::Array(Box::new(type_from_tag(table, column, inner, raw)?)));
    }
    let sql_type = match tag.as_str() {
        "uuid" => SqlType::Uuid,
        "text" | "string" => SqlType::Text,
        "varchar" | "character varying" => SqlType::VarChar(
            raw.get("length").and_then(Value::as_u64).map(|l| l as u32),
        ),
        "integer" | "int" | "int4" => SqlType::Integer,
        "bigint" | "int8" => SqlType::BigInt,
        "serial" => SqlType::Serial,
        "boolean" | "bool" => SqlType::Boolean,
        "real" | "float4" => SqlType::Real,
        "double" | "double precision" | "float8" => SqlType::DoublePrecision,
        "numeric" | "decimal" => SqlType::Numeric,
        "timestamp" if flag(raw, &["withTimezone"]) => SqlType::TimestampTz,
        "timestamp" => SqlType::Timestamp,
        "timestamptz" => SqlType::TimestampTz,
        "json" => SqlType::Json,
        "jsonb" => SqlType::Jsonb,
        "vector" => {
            let dimension = raw
                .get("dimensions")
                .or_else(|| raw.get("dimension"))
                .and_then(Value::as_u64)
                .ok_or_else(|| invalid(table, &format!("vector column '{column}' has no dimensions")))?;
            SqlType::Vector(dimension as usize)
        }
        other => SqlType::Custom(other.to_uppercase()),
    };
    Ok(sql_type)
}

fn classify_default(raw: &Value) -> ColumnDefault {
    match raw {
        Value::Object(obj) => match non_empty_str(obj.get("sql")) {
            Some(expr) => ColumnDefault::Expression(expr.to_string()),
            None => ColumnDefault::Literal(raw.clone()),
        },
        Value::String(s) if is_sql_function_default(s) => ColumnDefault::Expression(s.clone()),
        other => ColumnDefault::Literal(other.clone()),
    }
}

/// Column names from an array of strings or `{ "name": ... }` objects; `None` if any entry is neither
fn column_names(value: Option<&Value>) -> Option<Vec<String>> {
    let Value::Array(items) = value? else {
        return None;
    };
    items
        .iter()
        .map(|item| match item {
            Value::String(s) => Some(s.clone()),
            other => non_empty_str(other.get("name")).map(str::to_string),
        })
        .collect()
}

fn parse_named_columns(table: &str, config: &Value, suffix: &str) -> Option<(String, Vec<String>)> {
    let columns = column_names(config.get("columns")).filter(|c| !c.is_empty())?;
    let name = non_empty_str(config.get("name"))
        .map(str::to_string)
        .unwrap_or_else(|| super::definition::constraint_name(&[table, &columns.join("_"), suffix]));
    Some((name, columns))
}

fn apply_constraint(
    table: &mut TableDefinition,
    kind: &str,
    config: &Value,
    known: &HashSet<String>,
    pending_fks: &mut Vec<ForeignKeyDefinition>,
) {
    let table_name = table.name.clone();
    let normalized = kind.to_lowercase().replace(['_', '-'], "");
    match normalized.as_str() {
        "primarykey" | "pk" => match parse_named_columns(&table_name, config, "pk") {
            Some((name, columns)) => table.composite_primary_key = Some(CompositePrimaryKey { name, columns }),
            None => warn!(table = table_name.as_str(), "Primary key builder without columns; ignoring"),
        },
        "unique" => match parse_named_columns(&table_name, config, "unique") {
            Some((name, columns)) => table.unique_constraints.push(UniqueConstraint { name, columns }),
            None => warn!(table = table_name.as_str(), "Unique builder without columns; ignoring"),
        },
        "index" | "uniqueindex" => match parse_named_columns(&table_name, config, "idx") {
            Some((name, columns)) => {
                let mut index = IndexDefinition::new(name, columns);
                index.unique = normalized == "uniqueindex" || flag(config, &["unique"]);
                index.method = non_empty_str(config.get("using")).map(str::to_string);
                table.indexes.push(index);
            }
            None => warn!(table = table_name.as_str(), "Index builder without columns; ignoring"),
        },
        "check" => {
            let name = non_empty_str(config.get("name"));
            let expression = non_empty_str(config.get("expression")).or_else(|| non_empty_str(config.get("sql")));
            match (name, expression) {
                (Some(name), Some(expression)) => table.check_constraints.push(CheckConstraint::new(name, expression)),
                _ => warn!(table = table_name.as_str(), "Check builder needs a name and an expression; ignoring"),
            }
        }
        "foreignkey" | "fk" => {
            if let Some(fk) = parse_foreign_key(&table_name, config, known, None) {
                pending_fks.push(fk);
            }
        }
        other => warn!(table = table_name.as_str(), kind = other, "Unknown constraint builder; ignoring"),
    }
}

fn extra_config_builders(extra: Option<&Value>) -> Vec<&Value> {
    match extra {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => Vec::new(),
    }
}

fn unwrap_reference(raw: &Value) -> &Value {
    let mut current = raw;
    for _ in 0..MAX_REFERENCE_DEPTH {
        match current.get("reference") {
            Some(inner) if inner.is_object() => current = inner,
            _ => break,
        }
    }
    current
}

/// Referenced table name; a nested descriptor is resolved recursively, anything else is rejected
fn referenced_table_name(reference: &Value) -> Option<String> {
    for key in ["foreignTable", "table"] {
        match reference.get(key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return Some(s.clone()),
            Some(nested @ Value::Object(_)) => {
                if let Some(name) = resolve_table_name(None, nested) {
                    return Some(name);
                }
            }
            _ => {}
        }
    }
    None
}

/// `customer_id` -> `customers` / `customer` / `customeres`, if one of them is a known table
fn infer_table_from_column(column: &str, known: &HashSet<String>) -> Option<String> {
    let stem = column.strip_suffix("_id")?;
    [format!("{stem}s"), stem.to_string(), format!("{stem}es")]
        .into_iter()
        .find(|candidate| known.contains(candidate))
}

fn parse_foreign_key(
    table: &str,
    raw: &Value,
    known: &HashSet<String>,
    local_column: Option<&str>,
) -> Option<ForeignKeyDefinition> {
    let reference = unwrap_reference(raw);

    let columns = column_names(reference.get("columns"))
        .filter(|c| !c.is_empty())
        .or_else(|| local_column.map(|c| vec![c.to_string()]));
    let Some(columns) = columns else {
        warn!(table, "Dropping foreign key without local columns");
        return None;
    };

    let foreign_table = referenced_table_name(reference)
        .or_else(|| columns.first().and_then(|c| infer_table_from_column(c, known)));
    let Some(foreign_table) = foreign_table else {
        warn!(table, columns = ?columns, "Dropping foreign key: referenced table could not be resolved");
        return None;
    };

    let foreign_columns = column_names(reference.get("foreignColumns"))
        .filter(|c| !c.is_empty())
        .or_else(|| non_empty_str(reference.get("column")).map(|c| vec![c.to_string()]))
        .unwrap_or_else(|| vec!["id".to_string()]);

    if foreign_columns.len() != columns.len() {
        warn!(table, foreign_table = foreign_table.as_str(), "Dropping foreign key: column count mismatch");
        return None;
    }

    let action = |key: &str| {
        non_empty_str(raw.get(key))
            .or_else(|| non_empty_str(reference.get(key)))
            .and_then(ReferentialAction::parse)
    };

    let mut fk = ForeignKeyDefinition::new(columns, foreign_table, foreign_columns);
    fk.name = non_empty_str(raw.get("name"))
        .or_else(|| non_empty_str(reference.get("name")))
        .unwrap_or_default()
        .to_string();
    fk.foreign_schema = non_empty_str(reference.get("foreignSchema")).map(str::to_string);
    fk.on_delete = action("onDelete");
    fk.on_update = action("onUpdate");
    Some(fk)
}

fn apply_composite_key_override(table: &mut TableDefinition) {
    if table.composite_primary_key.is_some() {
        return;
    }
    let Some((_, columns)) = COMPOSITE_KEY_OVERRIDES.iter().find(|(name, _)| *name == table.name) else {
        return;
    };
    if columns.iter().all(|c| table.get_column(c).is_some()) {
        debug!(table = table.name.as_str(), "Applying composite primary key override");
        let name = super::definition::constraint_name(&[table.name.as_str(), &columns.join("_"), "pk"]);
        table.composite_primary_key = Some(CompositePrimaryKey {
            name,
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
    }
}

/// A one-column "composite" key is just a primary key column
fn collapse_single_column_key(table: &mut TableDefinition) {
    let single = match &table.composite_primary_key {
        Some(pk) if pk.columns.len() == 1 => pk.columns[0].clone(),
        _ => return,
    };
    if let Some(column) = table.columns.iter_mut().find(|c| c.name == single) {
        column.primary_key = true;
        column.not_null = true;
        table.composite_primary_key = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_table_name_resolution_order() {
        assert_eq!(
            resolve_table_name(Some("ordersTable"), &json!({"name": "orders_v2"})),
            Some("orders_v2".to_string())
        );
        assert_eq!(
            resolve_table_name(Some("ordersTable"), &json!({"$declaredName": "declared", "$originalName": "original"})),
            Some("declared".to_string())
        );
        assert_eq!(
            resolve_table_name(Some("ordersTable"), &json!({"$originalName": "original"})),
            Some("original".to_string())
        );
        assert_eq!(
            resolve_table_name(Some("userProfilesTable"), &json!({})),
            Some("user_profiles".to_string())
        );
        // a column called "name" is not a table name
        assert_eq!(
            resolve_table_name(Some("petsTable"), &json!({"name": {"type": "text"}})),
            Some("pets".to_string())
        );
    }

    #[test]
    fn test_scanned_columns_keep_structural_names() {
        let table = introspect_table(
            "petsTable",
            &json!({
                "$declaredName": "pets",
                "id": {"type": "uuid", "primaryKey": true},
                "name": {"type": "text", "notNull": true},
                "checks": {"type": "integer"}
            }),
        )
        .unwrap();

        assert_eq!(table.name, "pets");
        let mut names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["checks", "id", "name"]);
        let name = table.columns.iter().find(|c| c.name == "name").unwrap();
        assert!(name.not_null);
        assert!(is_table_descriptor(&json!({"name": {"type": "text"}})));
    }

    #[test]
    fn test_structural_key_with_column_list_is_not_a_column() {
        let table = introspect_table(
            "membershipsTable",
            &json!({
                "userId": {"type": "uuid"},
                "groupId": {"type": "uuid"},
                "primaryKey": {"type": "primaryKey", "name": "memberships_pk", "columns": ["user_id", "group_id"]}
            }),
        )
        .unwrap();

        let mut names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["group_id", "user_id"]);
        let pk = table.composite_primary_key.unwrap();
        assert_eq!(pk.name, "memberships_pk");
        assert_eq!(pk.columns, vec!["user_id", "group_id"]);
    }

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("ordersTable"), "orders");
        assert_eq!(derive_table_name("HTTPLogsTable"), "http_logs");
        assert_eq!(derive_table_name("Table"), "table");
        assert_eq!(derive_table_name("line_items"), "line_items");
    }

    #[test]
    fn test_scanned_columns_and_type_mapping() {
        let descriptor = json!({
            "$declaredName": "documents",
            "id": {"type": "uuid", "primaryKey": true, "default": "gen_random_uuid()"},
            "createdAt": {"type": "timestamp", "withTimezone": true, "notNull": true, "default": "now()"},
            "title": {"type": "varchar", "length": 200, "unique": true},
            "meta": {"type": "jsonb", "notNull": true, "default": {}},
            "tags": {"type": "text", "isArray": true, "default": []},
            "rank": {"dataType": "number", "default": 0},
            "dim768": {"type": "text"},
        });
        let table = introspect_table("documentsTable", &descriptor).unwrap();
        assert_eq!(table.name, "documents");

        let id = table.get_column("id").unwrap();
        assert!(id.primary_key && id.not_null);
        assert_eq!(id.default, Some(ColumnDefault::Expression("gen_random_uuid()".into())));

        let created = table.get_column("created_at").unwrap();
        assert_eq!(created.sql_type, SqlType::TimestampTz);
        assert_eq!(created.default, Some(ColumnDefault::Expression("now()".into())));

        assert_eq!(table.get_column("title").unwrap().sql_type, SqlType::VarChar(Some(200)));
        assert!(table.get_column("title").unwrap().unique);
        assert_eq!(table.get_column("meta").unwrap().default, Some(ColumnDefault::Literal(json!({}))));
        assert_eq!(
            table.get_column("tags").unwrap().sql_type,
            SqlType::Array(Box::new(SqlType::Text))
        );
        assert_eq!(table.get_column("rank").unwrap().sql_type, SqlType::Integer);
        assert_eq!(table.get_column("dim768").unwrap().sql_type, SqlType::Vector(768));
    }

    #[test]
    fn test_structured_columns_take_precedence() {
        let descriptor = json!({
            "name": "notes",
            "columns": {
                "id": {"name": "id", "type": "uuid", "primary": true},
                "body": {"name": "body", "type": "text", "nullable": false}
            },
            "stray": {"type": "integer"}
        });
        let table = introspect_table("notesTable", &descriptor).unwrap();
        let names: Vec<_> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "body"]);
        assert!(table.get_column("body").unwrap().not_null);
    }

    #[test]
    fn test_inline_and_nested_references() {
        let descriptor = json!({
            "$declaredName": "orders",
            "id": {"type": "uuid", "primaryKey": true},
            "customerId": {
                "name": "customer_id",
                "type": "uuid",
                "references": {"table": "customers", "column": "id", "onDelete": "cascade"}
            },
            "foreignKeys": [
                {
                    "name": "orders_parent_fk",
                    "reference": {"reference": {
                        "columns": [{"name": "parent_id"}],
                        "foreignTable": {"$originalName": "orders"},
                        "foreignColumns": ["id"]
                    }},
                    "onDelete": "set null"
                }
            ],
            "parentId": {"name": "parent_id", "type": "uuid"}
        });
        let table = introspect_table("ordersTable", &descriptor).unwrap();
        assert_eq!(table.foreign_keys.len(), 2);

        let customer = &table.foreign_keys[0];
        assert_eq!(customer.foreign_table, "customers");
        assert_eq!(customer.columns, vec!["customer_id"]);
        assert_eq!(customer.on_delete, Some(ReferentialAction::Cascade));
        assert_eq!(customer.name, "orders_customer_id_customers_id_fk");

        let parent = &table.foreign_keys[1];
        assert_eq!(parent.name, "orders_parent_fk");
        assert_eq!(parent.foreign_table, "orders");
        assert_eq!(parent.on_delete, Some(ReferentialAction::SetNull));
        assert_eq!(table.dependencies(), vec!["customers".to_string()]);
    }

    #[test]
    fn test_unresolvable_reference_is_dropped() {
        let descriptor = json!({
            "$declaredName": "orders",
            "id": {"type": "uuid", "primaryKey": true},
            "foreignKeys": [
                {"reference": {"columns": ["vendor_id"], "foreignTable": {"columns": {}}}},
                {"reference": {"columns": ["buyer_id"], "foreignTable": 42}}
            ]
        });
        let table = introspect_table("ordersTable", &descriptor).unwrap();
        assert!(table.foreign_keys.is_empty());
    }

    #[test]
    fn test_reference_inferred_from_known_tables() {
        let exports = json!({
            "customersTable": {"id": {"type": "uuid", "primaryKey": true}},
            "ordersTable": {
                "id": {"type": "uuid", "primaryKey": true},
                "customer_id": {"type": "uuid"},
                "foreignKeys": [{"reference": {"columns": ["customer_id"]}}]
            }
        });
        let schema = introspect_extension("alpha", exports.as_object().unwrap());
        let orders = schema.get_table("orders").unwrap();
        assert_eq!(orders.foreign_keys[0].foreign_table, "customers");
        assert_eq!(orders.foreign_keys[0].foreign_columns, vec!["id"]);
    }

    #[test]
    fn test_extra_config_array_and_map() {
        let array_form = json!({
            "$declaredName": "memberships",
            "user_id": {"type": "uuid"},
            "group_id": {"type": "uuid"},
            "extraConfig": [
                {"kind": "primaryKey", "$config": {"name": "memberships_pk", "columns": ["user_id", "group_id"]}},
                {"kind": "index", "$config": {"name": "idx_memberships_group", "columns": ["group_id"]}},
                {"kind": "check", "$config": {"name": "no_self", "expression": "user_id <> group_id"}}
            ]
        });
        let table = introspect_table("membershipsTable", &array_form).unwrap();
        let pk = table.composite_primary_key.as_ref().unwrap();
        assert_eq!(pk.name, "memberships_pk");
        assert_eq!(pk.columns, vec!["user_id", "group_id"]);
        assert_eq!(table.indexes[0].name, "idx_memberships_group");
        assert_eq!(table.check_constraints[0].expression, "user_id <> group_id");

        let map_form = json!({
            "$declaredName": "memberships",
            "user_id": {"type": "uuid"},
            "group_id": {"type": "uuid"},
            "extraConfig": {
                "pk": {"$config": {"columns": [{"name": "user_id"}, {"name": "group_id"}]}},
                "uniq": {"kind": "unique", "$config": {"columns": ["group_id", "user_id"]}}
            }
        });
        let table = introspect_table("membershipsTable", &map_form).unwrap();
        assert_eq!(
            table.composite_primary_key.unwrap().name,
            "memberships_user_id_group_id_pk"
        );
        assert_eq!(table.unique_constraints[0].name, "memberships_group_id_user_id_unique");
    }

    #[test]
    fn test_cache_composite_key_override() {
        let descriptor = json!({
            "key": {"type": "text", "notNull": true},
            "agentId": {"name": "agent_id", "type": "uuid", "notNull": true},
            "value": {"type": "jsonb"}
        });
        let table = introspect_table("cacheTable", &descriptor).unwrap();
        let pk = table.composite_primary_key.unwrap();
        assert_eq!(pk.columns, vec!["key", "agent_id"]);
    }

    #[test]
    fn test_descriptor_without_columns_is_rejected() {
        let err = introspect_table("emptyTable", &json!({"name": "empty"})).unwrap_err();
        assert!(matches!(err, StorageError::InvalidDescriptor { .. }));
        assert!(!is_table_descriptor(&json!("not a table")));
    }

    #[test]
    fn test_vector_without_dimensions_is_rejected() {
        let err = introspect_table("vecTable", &json!({"embedding": {"type": "vector"}})).unwrap_err();
        assert!(err.to_string().contains("no dimensions"));
    }
}
