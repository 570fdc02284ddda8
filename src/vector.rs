#![allow(missing_docs)]
//! Vector helpers for pgvector columns.
//!
//! Query vectors are sanitized before they reach the database: non-finite
//! components become 0 and every component is rounded to six decimals, so
//! floating-point drift cannot turn an exact match into a near miss.

use serde::{Deserialize, Deserializer};

use crate::error::{Result, StorageError};
use crate::executor::SqlValue;
use crate::schema::embedding::EmbeddingColumn;
use crate::types::UUID;

/// Decimal places kept by [`sanitize_vector`]
pub const VECTOR_PRECISION: i32 = 6;

/// Default number of results for similarity searches
pub const DEFAULT_MATCH_COUNT: usize = 10;

pub fn sanitize_vector(vector: &[f32]) -> Vec<f32> {
    let scale = 10f64.powi(VECTOR_PRECISION);
    vector
        .iter()
        .map(|&x| {
            if x.is_finite() {
                ((f64::from(x) * scale).round() / scale) as f32
            } else {
                0.0
            }
        })
        .collect()
}

/// pgvector text form, `[0.1,0.2,0.3]`
pub fn to_pg_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| StorageError::sql(None, format!("malformed vector literal: {text}")))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| StorageError::sql(None, format!("malformed vector component '{part}': {e}")))
        })
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VectorRepr {
    Text(String),
    Numbers(Vec<f32>),
}

/// Deserialize an optional vector from pgvector text or a JSON number array
pub fn deserialize_optional_vector<'de, D>(deserializer: D) -> std::result::Result<Option<Vec<f32>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<VectorRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(VectorRepr::Numbers(values)) => Ok(Some(values)),
        Some(VectorRepr::Text(text)) => parse_pg_vector(&text)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// Builder for a cosine-similarity search over memories.
///
/// Similarity is `1 - (embedding <=> query)`. Results are always scoped to one
/// agent and ordered by similarity, highest first.
#[derive(Debug, Clone)]
pub struct SimilarityQuery {
    pub column: EmbeddingColumn,
    pub agent_id: UUID,
    pub table_name: Option<String>,
    /// Inclusive lower bound on similarity
    pub threshold: Option<f32>,
    pub room_id: Option<UUID>,
    pub world_id: Option<UUID>,
    pub entity_id: Option<UUID>,
    pub unique: Option<bool>,
    pub count: usize,
}

impl SimilarityQuery {
    pub fn new(column: EmbeddingColumn, agent_id: UUID) -> Self {
        SimilarityQuery {
            column,
            agent_id,
            table_name: None,
            threshold: None,
            room_id: None,
            world_id: None,
            entity_id: None,
            unique: None,
            count: DEFAULT_MATCH_COUNT,
        }
    }

    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn room(mut self, room_id: UUID) -> Self {
        self.room_id = Some(room_id);
        self
    }

    pub fn world(mut self, world_id: UUID) -> Self {
        self.world_id = Some(world_id);
        self
    }

    pub fn entity(mut self, entity_id: UUID) -> Self {
        self.entity_id = Some(entity_id);
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// SQL and parameters; `$1` is the sanitized query vector
    pub fn build(&self, embedding: &[f32]) -> (String, Vec<SqlValue>) {
        let col = self.column.name();
        let similarity = format!("1 - (e.{col} <=> $1::vector)");

        let mut params = vec![
            SqlValue::Vector(sanitize_vector(embedding)),
            SqlValue::from(self.agent_id),
        ];
        let mut filters = vec!["m.agent_id = $2".to_string(), format!("e.{col} IS NOT NULL")];

        let mut push = |clause: &str, value: SqlValue, params: &mut Vec<SqlValue>| {
            params.push(value);
            filters.push(format!("{clause} ${}", params.len()));
        };
        if let Some(table) = &self.table_name {
            push("m.type =", table.as_str().into(), &mut params);
        }
        if let Some(threshold) = self.threshold {
            push(&format!("{similarity} >="), SqlValue::Float(Some(f64::from(threshold))), &mut params);
        }
        if let Some(room_id) = self.room_id {
            push("m.room_id =", room_id.into(), &mut params);
        }
        if let Some(world_id) = self.world_id {
            push("m.world_id =", world_id.into(), &mut params);
        }
        if let Some(entity_id) = self.entity_id {
            push("m.entity_id =", entity_id.into(), &mut params);
        }
        if let Some(unique) = self.unique {
            push("m.\"unique\" =", unique.into(), &mut params);
        }

        let sql = format!(
            r#"SELECT m.id, m.type, m.created_at, m.content, m.entity_id, m.agent_id, m.room_id, m.world_id, m."unique", m.metadata,
       e.{col}::text AS embedding,
       {similarity} AS similarity
FROM memories m
JOIN embeddings e ON e.memory_id = m.id
WHERE {}
ORDER BY similarity DESC
LIMIT {}"#,
            filters.join(" AND "),
            self.count
        );
        (sql, params)
    }
}
