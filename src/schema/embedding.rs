#![allow(missing_docs)]
//! Embedding schema
//!
//! One row per memory, with one nullable vector column per supported
//! dimension. An agent writes to exactly one of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{created_at_column, id_column};
use crate::error::{Result, StorageError};
use crate::migration::definition::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, ReferentialAction,
    SqlType, TableDefinition,
};
use crate::types::UUID;
use crate::vector::deserialize_optional_vector;

pub const DEFAULT_DIMENSION: usize = 384;

/// pgvector refuses HNSW indexes above this many dimensions
pub const MAX_INDEXED_DIMENSION: usize = 2000;

/// The vector column holding embeddings of one dimension
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingColumn {
    #[default]
    Dim384,
    Dim512,
    Dim768,
    Dim1024,
    Dim1536,
    Dim3072,
}

impl EmbeddingColumn {
    pub const ALL: [EmbeddingColumn; 6] = [
        EmbeddingColumn::Dim384,
        EmbeddingColumn::Dim512,
        EmbeddingColumn::Dim768,
        EmbeddingColumn::Dim1024,
        EmbeddingColumn::Dim1536,
        EmbeddingColumn::Dim3072,
    ];

    pub fn from_dimension(dimension: usize) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.dimension() == dimension)
            .ok_or(StorageError::UnsupportedDimension(dimension))
    }

    pub fn dimension(&self) -> usize {
        match self {
            EmbeddingColumn::Dim384 => 384,
            EmbeddingColumn::Dim512 => 512,
            EmbeddingColumn::Dim768 => 768,
            EmbeddingColumn::Dim1024 => 1024,
            EmbeddingColumn::Dim1536 => 1536,
            EmbeddingColumn::Dim3072 => 3072,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EmbeddingColumn::Dim384 => "dim384",
            EmbeddingColumn::Dim512 => "dim512",
            EmbeddingColumn::Dim768 => "dim768",
            EmbeddingColumn::Dim1024 => "dim1024",
            EmbeddingColumn::Dim1536 => "dim1536",
            EmbeddingColumn::Dim3072 => "dim3072",
        }
    }
}

pub fn table() -> TableDefinition {
    let mut table = TableDefinition::new("embeddings")
        .column(id_column())
        .column(ColumnDefinition::new("memory_id", SqlType::Uuid).not_null())
        .column(created_at_column());

    for column in EmbeddingColumn::ALL {
        table = table.column(ColumnDefinition::new(column.name(), SqlType::Vector(column.dimension())));
        if column.dimension() <= MAX_INDEXED_DIMENSION {
            table = table.index(
                IndexDefinition::new(
                    format!("idx_embeddings_{}", column.name()),
                    [format!("{} vector_cosine_ops", column.name())],
                )
                .using("hnsw"),
            );
        }
    }

    table
        .foreign_key(
            ForeignKeyDefinition::new(["memory_id"], "memories", ["id"])
                .named("fk_embedding_memory")
                .on_delete(ReferentialAction::Cascade),
        )
        .unique(Some("embeddings_memory_id_unique"), ["memory_id"])
        .index(IndexDefinition::new("idx_embedding_memory", ["memory_id"]))
}

#[derive(Clone, Debug, Deserialize)]
pub struct EmbeddingRecord {
    pub id: UUID,
    pub memory_id: Option<UUID>,
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "deserialize_optional_vector")]
    pub embedding: Option<Vec<f32>>,
}

impl EmbeddingRecord {
    pub fn dimension(&self) -> usize {
        self.embedding.as_ref().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_for_dimension() {
        assert_eq!(EmbeddingColumn::from_dimension(768).unwrap(), EmbeddingColumn::Dim768);
        assert_eq!(EmbeddingColumn::from_dimension(3072).unwrap().name(), "dim3072");
        assert!(matches!(
            EmbeddingColumn::from_dimension(100),
            Err(StorageError::UnsupportedDimension(100))
        ));
    }

    #[test]
    fn test_oversized_columns_are_not_indexed() {
        let table = table();
        assert!(table.get_column("dim3072").is_some());
        assert!(table.indexes.iter().all(|i| i.name != "idx_embeddings_dim3072"));
        assert!(table.indexes.iter().any(|i| i.name == "idx_embeddings_dim1536"));
    }
}
