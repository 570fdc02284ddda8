#![allow(missing_docs)]
//! Creation order for the tables of one migration run.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use super::definition::TableDefinition;

/// Order tables so each one follows the tables it references.
///
/// Depth-first topological sort in declaration order. References to tables
/// outside `tables` are ignored. A cycle is logged and broken at the edge that
/// closes it; the constraint phase is what makes cyclic references safe.
pub fn resolve_creation_order(tables: &[TableDefinition]) -> Vec<String> {
    let by_name: HashMap<&str, &TableDefinition> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    let mut visited: HashSet<String> = HashSet::new();
    let mut visiting: HashSet<String> = HashSet::new();
    let mut order: Vec<String> = Vec::with_capacity(tables.len());

    for table in tables {
        visit(&table.name, &by_name, &mut visited, &mut visiting, &mut order);
    }

    order
}

fn visit(
    name: &str,
    by_name: &HashMap<&str, &TableDefinition>,
    visited: &mut HashSet<String>,
    visiting: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if visited.contains(name) {
        return;
    }
    if visiting.contains(name) {
        warn!(table = name, "Circular foreign key dependency detected; continuing");
        return;
    }
    let Some(table) = by_name.get(name) else {
        return;
    };

    visiting.insert(name.to_string());
    for dependency in table.dependencies() {
        visit(&dependency, by_name, visited, visiting, order);
    }
    visiting.remove(name);

    visited.insert(name.to_string());
    order.push(name.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::definition::{ColumnDefinition, ForeignKeyDefinition, SqlType};
    use pretty_assertions::assert_eq;

    fn table(name: &str, references: &[&str]) -> TableDefinition {
        let mut table = TableDefinition::new(name)
            .column(ColumnDefinition::new("id", SqlType::Uuid).primary_key());
        for target in references {
            let column = format!("{target}_id");
            table = table
                .column(ColumnDefinition::new(column.clone(), SqlType::Uuid))
                .foreign_key(ForeignKeyDefinition::new([column], *target, ["id"]));
        }
        table
    }

    #[test]
    fn test_dependency_precedes_dependent_in_either_order() {
        let forward = resolve_creation_order(&[table("orders", &["customers"]), table("customers", &[])]);
        assert_eq!(forward, vec!["customers", "orders"]);

        let backward = resolve_creation_order(&[table("customers", &[]), table("orders", &["customers"])]);
        assert_eq!(backward, vec!["customers", "orders"]);
    }

    #[test]
    fn test_transitive_chain() {
        let order = resolve_creation_order(&[
            table("line_items", &["orders", "products"]),
            table("orders", &["customers"]),
            table("products", &[]),
            table("customers", &[]),
        ]);
        let pos = |n: &str| order.iter().position(|t| t == n).unwrap();
        assert!(pos("customers") < pos("orders"));
        assert!(pos("orders") < pos("line_items"));
        assert!(pos("products") < pos("line_items"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_cycles_do_not_fail() {
        let order = resolve_creation_order(&[table("a", &["b"]), table("b", &["a"])]);
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_self_reference_and_external_tables_ignored() {
        let order = resolve_creation_order(&[table("nodes", &["nodes", "agents"])]);
        assert_eq!(order, vec!["nodes"]);
    }
}
