#![allow(missing_docs)]
//! SQL generation for migration DDL.

use once_cell::sync::Lazy;
use regex::Regex;

use super::definition::{
    CheckConstraint, ColumnDefault, ColumnDefinition, ForeignKeyDefinition, IndexDefinition,
    SqlType, TableDefinition, UniqueConstraint,
};

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Substrings marking a default as an SQL function call rather than a literal
const SQL_FUNCTION_DEFAULTS: &[&str] = &[
    "now()",
    "current_timestamp",
    "current_date",
    "localtimestamp",
    "gen_random_uuid()",
    "uuid_generate_v4()",
    "random()",
];

/// Double-quote an identifier, escaping embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

pub fn is_sql_function_default(value: &str) -> bool {
    let lower = value.to_lowercase();
    SQL_FUNCTION_DEFAULTS.iter().any(|f| lower.contains(f))
}

/// Render a column default for a column of `sql_type`
pub fn format_default(default: &ColumnDefault, sql_type: &SqlType) -> String {
    use serde_json::Value;

    let value = match default {
        ColumnDefault::Expression(expr) => return expr.clone(),
        ColumnDefault::Literal(value) => value,
    };

    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) if sql_type.is_numeric() => n.to_string(),
        Value::Number(n) => quote_literal(&n.to_string()),
        Value::String(s) if is_sql_function_default(s) => s.clone(),
        Value::String(s) if sql_type.is_numeric() && s.parse::<f64>().is_ok() => s.clone(),
        Value::String(s) if *sql_type == SqlType::Boolean => match s.to_lowercase().as_str() {
            "true" | "false" => s.to_lowercase(),
            _ => quote_literal(s),
        },
        Value::String(s) => quote_literal(s),
        Value::Object(map) if map.is_empty() && sql_type.is_json() => {
            format!("'{{}}'::{}", json_cast(sql_type))
        }
        Value::Array(items) if items.is_empty() && sql_type.is_json() => {
            format!("'[]'::{}", json_cast(sql_type))
        }
        Value::Array(items) if matches!(sql_type, SqlType::Array(_)) => {
            if items.is_empty() {
                format!("'{{}}'::{sql_type}")
            } else {
                let elements: Vec<String> = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => quote_literal(s),
                        other => quote_literal(&other.to_string()),
                    })
                    .collect();
                format!("ARRAY[{}]::{sql_type}", elements.join(", "))
            }
        }
        other if sql_type.is_json() => {
            format!("{}::{}", quote_literal(&other.to_string()), json_cast(sql_type))
        }
        other => quote_literal(&other.to_string()),
    }
}

fn json_cast(sql_type: &SqlType) -> &'static str {
    match sql_type {
        SqlType::Json => "json",
        _ => "jsonb",
    }
}

/// One column line of a CREATE TABLE
pub fn column_sql(column: &ColumnDefinition, has_composite_key: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.sql_type);
    if column.primary_key && !has_composite_key {
        sql.push_str(" PRIMARY KEY");
    }
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if column.unique {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&format_default(default, &column.sql_type));
    }
    sql
}

fn column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// CREATE TABLE without any foreign keys
pub fn create_table_sql(schema: &str, table: &TableDefinition) -> String {
    let has_composite_key = table.composite_primary_key.is_some();
    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_sql(c, has_composite_key))
        .collect();

    if let Some(pk) = &table.composite_primary_key {
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            quote_ident(&pk.name),
            column_list(&pk.columns)
        ));
    }
    for unique in &table.unique_constraints {
        lines.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_ident(&unique.name),
            column_list(&unique.columns)
        ));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        qualified(schema, &table.name),
        lines.join(",\n    ")
    )
}

pub fn create_index_sql(schema: &str, table: &str, index: &IndexDefinition) -> String {
    let expressions: Vec<String> = index
        .expressions
        .iter()
        .map(|e| {
            if PLAIN_IDENTIFIER.is_match(e) {
                quote_ident(e)
            } else {
                e.clone()
            }
        })
        .collect();
    let using = index
        .method
        .as_deref()
        .map(|m| format!(" USING {m}"))
        .unwrap_or_default();
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {}{} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        qualified(schema, table),
        using,
        expressions.join(", ")
    )
}

pub fn add_foreign_key_sql(
    schema: &str,
    table: &str,
    fk: &ForeignKeyDefinition,
    foreign_schema: &str,
) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        qualified(schema, table),
        quote_ident(&fk.name),
        column_list(&fk.columns),
        qualified(foreign_schema, &fk.foreign_table),
        column_list(&fk.foreign_columns)
    );
    if let Some(action) = fk.on_delete {
        sql.push_str(" ON DELETE ");
        sql.push_str(action.as_sql());
    }
    if let Some(action) = fk.on_update {
        sql.push_str(" ON UPDATE ");
        sql.push_str(action.as_sql());
    }
    sql
}

pub fn add_check_sql(schema: &str, table: &str, check: &CheckConstraint) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({})",
        qualified(schema, table),
        quote_ident(&check.name),
        check.expression
    )
}

pub fn add_unique_sql(schema: &str, table: &str, unique: &UniqueConstraint) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
        qualified(schema, table),
        quote_ident(&unique.name),
        column_list(&unique.columns)
    )
}

pub fn create_extension_sql(extension: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(extension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::definition::{ReferentialAction, TableDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn cache_table() -> TableDefinition {
        TableDefinition::new("cache")
            .column(ColumnDefinition::new("key", SqlType::Text).primary_key())
            .column(ColumnDefinition::new("agent_id", SqlType::Uuid).primary_key())
            .column(
                ColumnDefinition::new("value", SqlType::Jsonb)
                    .not_null()
                    .default_value(json!({})),
            )
            .primary_key(["key", "agent_id"])
    }

    #[test]
    fn test_composite_key_suppresses_column_primary_keys() {
        let sql = create_table_sql("public", &cache_table());
        assert!(!sql.contains("PRIMARY KEY NOT NULL"), "{sql}");
        assert_eq!(sql.matches("PRIMARY KEY").count(), 1, "{sql}");
        assert!(sql.contains(r#"CONSTRAINT "cache_key_agent_id_pk" PRIMARY KEY ("key", "agent_id")"#));
        assert!(sql.contains(r#""value" JSONB NOT NULL DEFAULT '{}'::jsonb"#));
    }

    #[test]
    fn test_create_table_never_contains_foreign_keys() {
        let table = TableDefinition::new("orders")
            .column(ColumnDefinition::new("id", SqlType::Uuid).primary_key())
            .column(ColumnDefinition::new("customer_id", SqlType::Uuid))
            .foreign_key(
                crate::migration::definition::ForeignKeyDefinition::new(
                    ["customer_id"],
                    "customers",
                    ["id"],
                )
                .on_delete(ReferentialAction::Cascade),
            )
            .unique(None, ["customer_id"]);

        let sql = create_table_sql("alpha", &table);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"alpha\".\"orders\" (\n    \"id\" UUID PRIMARY KEY NOT NULL,\n    \"customer_id\" UUID,\n    CONSTRAINT \"orders_customer_id_unique\" UNIQUE (\"customer_id\")\n)"
        );

        let fk_sql = add_foreign_key_sql("alpha", "orders", &table.foreign_keys[0], "alpha");
        assert_eq!(
            fk_sql,
            "ALTER TABLE \"alpha\".\"orders\" ADD CONSTRAINT \"orders_customer_id_customers_id_fk\" FOREIGN KEY (\"customer_id\") REFERENCES \"alpha\".\"customers\" (\"id\") ON DELETE CASCADE"
        );
    }

    #[test]
    fn test_default_formatting() {
        let ts = SqlType::TimestampTz;
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!("now()")), &ts),
            "now()"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!("gen_random_uuid()")), &SqlType::Uuid),
            "gen_random_uuid()"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!({})), &SqlType::Jsonb),
            "'{}'::jsonb"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!([])), &SqlType::Jsonb),
            "'[]'::jsonb"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!(5)), &SqlType::Integer),
            "5"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!(true)), &SqlType::Boolean),
            "true"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!("it's")), &SqlType::Text),
            "'it''s'"
        );
        assert_eq!(
            format_default(
                &ColumnDefault::Literal(json!([])),
                &SqlType::Array(Box::new(SqlType::Text))
            ),
            "'{}'::TEXT[]"
        );
        assert_eq!(
            format_default(&ColumnDefault::Literal(json!({"a": 1})), &SqlType::Jsonb),
            "'{\"a\":1}'::jsonb"
        );
    }

    #[test]
    fn test_index_sql_quotes_plain_columns_only() {
        let idx = IndexDefinition::new("idx_memories_type_room", ["type", "room_id"]);
        assert_eq!(
            create_index_sql("public", "memories", &idx),
            r#"CREATE INDEX IF NOT EXISTS "idx_memories_type_room" ON "public"."memories" ("type", "room_id")"#
        );

        let hnsw = IndexDefinition::new("idx_embeddings_dim384", ["dim384 vector_cosine_ops"]).using("hnsw");
        assert_eq!(
            create_index_sql("public", "embeddings", &hnsw),
            r#"CREATE INDEX IF NOT EXISTS "idx_embeddings_dim384" ON "public"."embeddings" USING hnsw (dim384 vector_cosine_ops)"#
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident(r#"we"ird"#), r#""we""ird""#);
    }
}
