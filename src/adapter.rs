#![allow(missing_docs)]
//! Engine-agnostic [`DatabaseAdapter`] over a [`SqlExecutor`].
//!
//! Every round-trip goes through the retry layer and is tagged with the
//! operation name, so a failure that survives retries reads like
//! `create_memory failed: SQL error [23503]: ...`. Inserts that carry their own
//! id use `ON CONFLICT` so replaying a write whose first attempt committed has
//! no further effect.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::base::*;
use crate::config::DatabaseConfig;
use crate::error::{Result, StorageError};
use crate::executor::{decode_rows, Row, SqlExecutor, SqlValue, Statement};
use crate::migration::{ExtensionSchema, MigrationReport, RuntimeMigrator};
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::schema::*;
use crate::types::{
    Agent, Character, Component, Entity, Goal, GoalStatus, Log, Memory, Relationship, Room, World,
    UUID,
};
use crate::vector::{deserialize_optional_vector, sanitize_vector, SimilarityQuery};

/// Similarity at or above which a new memory counts as a duplicate
pub const DUPLICATE_SIMILARITY_THRESHOLD: f32 = 0.95;

/// Input length limit of the `levenshtein` function
pub const LEVENSHTEIN_MAX_LENGTH: usize = 255;

const AGENT_COLUMNS: &str = "id, enabled, created_at, updated_at, name, username, system, bio, \
     message_examples, post_examples, topics, adjectives, knowledge, plugins, settings, style, templates";

const MEMORY_COLUMNS: &str = r#"m.id, m.type, m.created_at, m.content, m.entity_id, m.agent_id, m.room_id, m.world_id, m."unique", m.metadata"#;

const ROOM_COLUMNS: &str = "id, name, agent_id, source, type, channel_id, server_id, world_id, metadata";

const COMPONENT_COLUMNS: &str =
    "id, entity_id, agent_id, room_id, world_id, source_entity_id, type, created_at, data";

const RELATIONSHIP_COLUMNS: &str =
    "id, source_entity_id, target_entity_id, agent_id, tags, metadata, created_at";

const GOAL_COLUMNS: &str = "id, agent_id, entity_id, room_id, name, status, description, objectives";

/// Positional parameters and the AND-ed conditions that use them
struct Filters {
    clauses: Vec<String>,
    params: Vec<SqlValue>,
}

impl Filters {
    fn new(params: Vec<SqlValue>) -> Self {
        Filters {
            clauses: Vec::new(),
            params,
        }
    }

    fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        self.params.push(value.into());
        format!("${}", self.params.len())
    }

    /// `"{lhs} ${n}"`, e.g. `and("m.room_id =", id)`
    fn and(&mut self, lhs: &str, value: impl Into<SqlValue>) {
        let placeholder = self.bind(value);
        self.clauses.push(format!("{lhs} {placeholder}"));
    }

    fn and_raw(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            "true".to_string()
        } else {
            self.clauses.join(" AND ")
        }
    }
}

fn limit_offset(count: Option<usize>, offset: Option<usize>) -> String {
    let mut sql = String::new();
    if let Some(count) = count {
        sql.push_str(&format!(" LIMIT {count}"));
    }
    if let Some(offset) = offset.filter(|o| *o > 0) {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    sql
}

/// One column of every row, decoded
fn column_values<T: DeserializeOwned>(rows: Vec<Row>, column: &str) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|mut row| {
            let value = row.remove(column).unwrap_or(serde_json::Value::Null);
            Ok(serde_json::from_value(value)?)
        })
        .collect()
}

#[derive(Deserialize)]
struct CountRow {
    count: i64,
}

#[derive(Deserialize)]
struct DimensionRow {
    dimension: Option<i64>,
}

#[derive(Deserialize)]
struct CachedEmbeddingRow {
    #[serde(default, deserialize_with = "deserialize_optional_vector")]
    embedding: Option<Vec<f32>>,
    levenshtein_score: i64,
}

/// SQL storage adapter scoped to one agent
pub struct SqlDatabaseAdapter {
    executor: Arc<dyn SqlExecutor>,
    migrator: RuntimeMigrator,
    agent_id: UUID,
    retry: RetryConfig,
    configured_dimension: Option<usize>,
    embedding_column: RwLock<Option<EmbeddingColumn>>,
}

impl SqlDatabaseAdapter {
    pub fn new(executor: Arc<dyn SqlExecutor>, agent_id: UUID, config: &DatabaseConfig) -> Self {
        SqlDatabaseAdapter {
            migrator: RuntimeMigrator::new(executor.clone()),
            executor,
            agent_id,
            retry: config.retry.clone(),
            configured_dimension: config.embedding_dimension,
            embedding_column: RwLock::new(None),
        }
    }

    pub fn agent_id(&self) -> UUID {
        self.agent_id
    }

    pub fn executor(&self) -> &Arc<dyn SqlExecutor> {
        &self.executor
    }

    pub fn migrator(&self) -> &RuntimeMigrator {
        &self.migrator
    }

    /// The column embeddings are written to; 384 dimensions until one is chosen
    pub fn embedding_column(&self) -> EmbeddingColumn {
        self.embedding_column.read().unwrap_or_default()
    }

    async fn fetch_all(&self, operation: &str, sql: &str, params: Vec<SqlValue>) -> Result<Vec<Row>> {
        retry_with_backoff(|| self.executor.fetch_all(sql, &params), &self.retry, operation)
            .await
            .map_err(|e| e.context(operation))
    }

    async fn fetch_records<T: DeserializeOwned>(
        &self,
        operation: &str,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Vec<T>> {
        decode_rows(self.fetch_all(operation, sql, params).await?)
    }

    async fn fetch_record<T: DeserializeOwned>(
        &self,
        operation: &str,
        sql: &str,
        params: Vec<SqlValue>,
    ) -> Result<Option<T>> {
        Ok(self
            .fetch_records(operation, sql, params)
            .await?
            .into_iter()
            .next())
    }

    async fn execute(&self, operation: &str, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        retry_with_backoff(|| self.executor.execute(sql, &params), &self.retry, operation)
            .await
            .map_err(|e| e.context(operation))
    }

    async fn transaction(&self, operation: &str, statements: Vec<Statement>) -> Result<()> {
        if statements.is_empty() {
            return Ok(());
        }
        retry_with_backoff(|| self.executor.transaction(&statements), &self.retry, operation)
            .await
            .map_err(|e| e.context(operation))
    }

    async fn count(&self, operation: &str, sql: &str, params: Vec<SqlValue>) -> Result<i64> {
        Ok(self
            .fetch_record::<CountRow>(operation, sql, params)
            .await?
            .map_or(0, |r| r.count))
    }

    /// Dimension of this agent's stored embeddings, if any exist
    async fn stored_dimension(&self) -> Result<Option<usize>> {
        let cases: Vec<String> = EmbeddingColumn::ALL
            .iter()
            .map(|c| format!("WHEN e.{} IS NOT NULL THEN {}", c.name(), c.dimension()))
            .collect();
        let any_present: Vec<String> = EmbeddingColumn::ALL
            .iter()
            .map(|c| format!("e.{} IS NOT NULL", c.name()))
            .collect();
        let sql = format!(
            "SELECT CASE {} END AS dimension FROM embeddings e JOIN memories m ON m.id = e.memory_id \
             WHERE m.agent_id = $1 AND ({}) LIMIT 1",
            cases.join(" "),
            any_present.join(" OR ")
        );
        let row: Option<DimensionRow> = self
            .fetch_record("ensure_embedding_dimension", &sql, vec![self.agent_id.into()])
            .await?;
        Ok(row.and_then(|r| r.dimension).map(|d| d as usize))
    }

    /// Pick up the column of embeddings this agent already stores
    async fn restore_embedding_column(&self) -> Result<()> {
        let Some(dimension) = self.stored_dimension().await? else {
            return Ok(());
        };
        let column = EmbeddingColumn::from_dimension(dimension)?;
        *self.embedding_column.write() = Some(column);
        debug!(agent_id = %self.agent_id, dimension, "Using stored embedding dimension");
        Ok(())
    }

    /// Column for an embedding of `dimension`, switching only if the agent has none stored yet
    async fn column_for(&self, dimension: usize) -> Result<EmbeddingColumn> {
        if let Some(current) = *self.embedding_column.read() {
            if current.dimension() == dimension {
                return Ok(current);
            }
        }
        self.ensure_embedding_dimension(dimension).await?;
        EmbeddingColumn::from_dimension(dimension)
    }

    fn memory_select(&self, column: EmbeddingColumn) -> String {
        format!(
            "SELECT {MEMORY_COLUMNS}, e.{col}::text AS embedding FROM memories m \
             LEFT JOIN embeddings e ON e.memory_id = m.id",
            col = column.name()
        )
    }

    fn agent_params(&self, agent: &Agent) -> Result<Vec<SqlValue>> {
        let c = &agent.character;
        Ok(vec![
            agent.id.into(),
            agent.enabled.into(),
            c.name.clone().into(),
            c.username.clone().into(),
            c.system.clone().into(),
            serde_json::to_value(&c.bio)?.into(),
            serde_json::to_value(&c.message_examples)?.into(),
            serde_json::to_value(&c.post_examples)?.into(),
            serde_json::to_value(&c.topics)?.into(),
            serde_json::to_value(&c.adjectives)?.into(),
            serde_json::to_value(&c.knowledge)?.into(),
            serde_json::to_value(&c.plugins)?.into(),
            serde_json::to_value(&c.settings)?.into(),
            serde_json::to_value(&c.style)?.into(),
            serde_json::to_value(&c.templates)?.into(),
        ])
    }

    fn room_params(&self, room: &Room) -> Result<Vec<SqlValue>> {
        Ok(vec![
            room.id.into(),
            room.name.clone().into(),
            room.agent_id.unwrap_or(self.agent_id).into(),
            room.source.clone().into(),
            room.room_type.clone().into(),
            room.channel_id.clone().into(),
            room.server_id.clone().into(),
            room.world_id.into(),
            serde_json::to_value(&room.metadata)?.into(),
        ])
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DatabaseAdapter for SqlDatabaseAdapter {
    async fn init(&self) -> Result<()> {
        let report = self.migrator.migrate(&core_extension()).await?;
        info!(
            agent_id = %self.agent_id,
            created = report.created_tables.len(),
            "Core tables ready"
        );
        match self.configured_dimension {
            Some(dimension) => self.ensure_embedding_dimension(dimension).await,
            None => self.restore_embedding_column().await,
        }
    }

    async fn is_ready(&self) -> Result<bool> {
        Ok(self.executor.ping().await.is_ok())
    }

    async fn close(&self) -> Result<()> {
        self.executor.close().await
    }

    async fn run_plugin_migrations(
        &self,
        schemas: &[ExtensionSchema],
    ) -> Result<Vec<MigrationReport>> {
        self.migrator.migrate_all(schemas).await
    }

    // =========================================================================
    // Agent Methods
    // =========================================================================

    async fn get_agent(&self, agent_id: &UUID) -> Result<Option<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        let record: Option<AgentRecord> = self
            .fetch_record("get_agent", &sql, vec![(*agent_id).into()])
            .await?;
        Ok(record.map(|r| r.to_agent()))
    }

    async fn get_agents(&self) -> Result<Vec<Agent>> {
        let sql = format!("SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at");
        let records: Vec<AgentRecord> = self.fetch_records("get_agents", &sql, vec![]).await?;
        Ok(records.iter().map(AgentRecord::to_agent).collect())
    }

    async fn create_agent(&self, agent: &Agent) -> Result<bool> {
        let names = serde_json::json!([agent.character.name]);
        self.transaction(
            "create_agent",
            vec![
                Statement::new(
                    r#"
                    INSERT INTO agents (id, enabled, name, username, system, bio, message_examples, post_examples,
                                        topics, adjectives, knowledge, plugins, settings, style, templates)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                    self.agent_params(agent)?,
                ),
                Statement::new(
                    "INSERT INTO entities (id, agent_id, names) VALUES ($1, $1, $2) ON CONFLICT (id) DO NOTHING",
                    vec![agent.id.into(), names.into()],
                ),
            ],
        )
        .await?;
        debug!(agent_id = %agent.id, name = agent.name(), "Created agent");
        Ok(true)
    }

    async fn update_agent(&self, agent_id: &UUID, agent: &Agent) -> Result<bool> {
        let mut params = self.agent_params(agent)?;
        params[0] = (*agent_id).into();
        let updated = self
            .execute(
                "update_agent",
                r#"
                UPDATE agents SET enabled = $2, name = $3, username = $4, system = $5, bio = $6,
                    message_examples = $7, post_examples = $8, topics = $9, adjectives = $10,
                    knowledge = $11, plugins = $12, settings = $13, style = $14, templates = $15,
                    updated_at = now()
                WHERE id = $1
                "#,
                params,
            )
            .await?;
        Ok(updated > 0)
    }

    async fn delete_agent(&self, agent_id: &UUID) -> Result<bool> {
        let deleted = self
            .execute("delete_agent", "DELETE FROM agents WHERE id = $1", vec![(*agent_id).into()])
            .await?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Character Methods
    // =========================================================================

    async fn create_character(&self, character: &Character) -> Result<UUID> {
        let id = character.id.unwrap_or_else(UUID::new_v4);
        let mut stored = character.clone();
        stored.id = Some(id);
        self.execute(
            "create_character",
            "INSERT INTO characters (id, name, data) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING",
            vec![id.into(), character.name.clone().into(), serde_json::to_value(&stored)?.into()],
        )
        .await?;
        Ok(id)
    }

    async fn get_character(&self, id: &UUID) -> Result<Option<Character>> {
        let record: Option<CharacterRecord> = self
            .fetch_record(
                "get_character",
                "SELECT id, name, data, created_at, updated_at FROM characters WHERE id = $1",
                vec![(*id).into()],
            )
            .await?;
        record.map(|r| r.to_character()).transpose()
    }

    async fn get_character_by_name(&self, name: &str) -> Result<Option<Character>> {
        let record: Option<CharacterRecord> = self
            .fetch_record(
                "get_character_by_name",
                "SELECT id, name, data, created_at, updated_at FROM characters WHERE name = $1",
                vec![name.into()],
            )
            .await?;
        record.map(|r| r.to_character()).transpose()
    }

    async fn list_characters(&self) -> Result<Vec<Character>> {
        let records: Vec<CharacterRecord> = self
            .fetch_records(
                "list_characters",
                "SELECT id, name, data, created_at, updated_at FROM characters ORDER BY name",
                vec![],
            )
            .await?;
        records.iter().map(CharacterRecord::to_character).collect()
    }

    async fn update_character(&self, id: &UUID, character: &Character) -> Result<bool> {
        let mut stored = character.clone();
        stored.id = Some(*id);
        let updated = self
            .execute(
                "update_character",
                "UPDATE characters SET name = $2, data = $3, updated_at = now() WHERE id = $1",
                vec![(*id).into(), character.name.clone().into(), serde_json::to_value(&stored)?.into()],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn delete_character(&self, id: &UUID) -> Result<bool> {
        let deleted = self
            .execute("delete_character", "DELETE FROM characters WHERE id = $1", vec![(*id).into()])
            .await?;
        Ok(deleted > 0)
    }

    // =========================================================================
    // Entity Methods
    // =========================================================================

    async fn get_entities_by_ids(&self, entity_ids: &[UUID]) -> Result<Vec<Entity>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let records: Vec<EntityRecord> = self
            .fetch_records(
                "get_entities_by_ids",
                "SELECT id, agent_id, names, metadata FROM entities WHERE id = ANY($1) AND agent_id = $2",
                vec![entity_ids.to_vec().into(), self.agent_id.into()],
            )
            .await?;
        Ok(records.iter().map(EntityRecord::to_entity).collect())
    }

    async fn get_entities_for_room(
        &self,
        room_id: &UUID,
        include_components: bool,
    ) -> Result<Vec<Entity>> {
        let records: Vec<EntityRecord> = self
            .fetch_records(
                "get_entities_for_room",
                r#"
                SELECT DISTINCT e.id, e.agent_id, e.names, e.metadata
                FROM participants p
                JOIN entities e ON e.id = p.entity_id
                WHERE p.room_id = $1 AND p.agent_id = $2 AND e.agent_id = $2
                "#,
                vec![(*room_id).into(), self.agent_id.into()],
            )
            .await?;
        let mut entities: Vec<Entity> = records.iter().map(EntityRecord::to_entity).collect();

        if include_components && !entities.is_empty() {
            let ids: Vec<UUID> = entities.iter().map(|e| e.id).collect();
            let sql = format!(
                "SELECT {COMPONENT_COLUMNS} FROM components WHERE entity_id = ANY($1) AND agent_id = $2"
            );
            let components: Vec<ComponentRecord> = self
                .fetch_records("get_entities_for_room", &sql, vec![ids.into(), self.agent_id.into()])
                .await?;

            let mut by_entity: HashMap<UUID, Vec<Component>> = HashMap::new();
            for record in &components {
                by_entity
                    .entry(record.entity_id)
                    .or_default()
                    .push(record.to_component());
            }
            for entity in &mut entities {
                entity.components = Some(by_entity.remove(&entity.id).unwrap_or_default());
            }
        }
        Ok(entities)
    }

    async fn create_entities(&self, entities: &[Entity]) -> Result<bool> {
        if entities.is_empty() {
            return Ok(false);
        }
        let statements = entities
            .iter()
            .map(|entity| {
                Ok(Statement::new(
                    "INSERT INTO entities (id, agent_id, names, metadata) VALUES ($1, $2, $3, $4) ON CONFLICT (id) DO NOTHING",
                    vec![
                        entity.id.into(),
                        self.agent_id.into(),
                        serde_json::to_value(&entity.names)?.into(),
                        serde_json::to_value(&entity.metadata)?.into(),
                    ],
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.transaction("create_entities", statements).await?;
        Ok(true)
    }

    async fn update_entity(&self, entity: &Entity) -> Result<()> {
        let updated = self
            .execute(
                "update_entity",
                "UPDATE entities SET names = $1, metadata = $2 WHERE id = $3 AND agent_id = $4",
                vec![
                    serde_json::to_value(&entity.names)?.into(),
                    serde_json::to_value(&entity.metadata)?.into(),
                    entity.id.into(),
                    self.agent_id.into(),
                ],
            )
            .await?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity: "entity",
                id: entity.id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_entity(&self, entity_id: &UUID) -> Result<()> {
        self.execute(
            "delete_entity",
            "DELETE FROM entities WHERE id = $1 AND agent_id = $2",
            vec![(*entity_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Component Methods
    // =========================================================================

    async fn get_component(
        &self,
        entity_id: &UUID,
        component_type: &str,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> Result<Option<Component>> {
        let mut filters = Filters::new(vec![]);
        filters.and("entity_id =", *entity_id);
        filters.and("type =", component_type);
        filters.and("agent_id =", self.agent_id);
        if let Some(world_id) = world_id {
            filters.and("world_id =", *world_id);
        }
        if let Some(source) = source_entity_id {
            filters.and("source_entity_id =", *source);
        }
        let sql = format!(
            "SELECT {COMPONENT_COLUMNS} FROM components WHERE {} ORDER BY created_at LIMIT 1",
            filters.sql()
        );
        let record: Option<ComponentRecord> =
            self.fetch_record("get_component", &sql, filters.params).await?;
        Ok(record.map(|r| r.to_component()))
    }

    async fn get_components(
        &self,
        entity_id: &UUID,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> Result<Vec<Component>> {
        let mut filters = Filters::new(vec![]);
        filters.and("entity_id =", *entity_id);
        filters.and("agent_id =", self.agent_id);
        if let Some(world_id) = world_id {
            filters.and("world_id =", *world_id);
        }
        if let Some(source) = source_entity_id {
            filters.and("source_entity_id =", *source);
        }
        let sql = format!(
            "SELECT {COMPONENT_COLUMNS} FROM components WHERE {} ORDER BY created_at",
            filters.sql()
        );
        let records: Vec<ComponentRecord> =
            self.fetch_records("get_components", &sql, filters.params).await?;
        Ok(records.iter().map(ComponentRecord::to_component).collect())
    }

    async fn create_component(&self, component: &Component) -> Result<bool> {
        self.execute(
            "create_component",
            r#"
            INSERT INTO components (id, entity_id, agent_id, room_id, world_id, source_entity_id, type, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
            vec![
                component.id.into(),
                component.entity_id.into(),
                self.agent_id.into(),
                component.room_id.into(),
                component.world_id.into(),
                component.source_entity_id.into(),
                component.component_type.clone().into(),
                component.data.clone().into(),
            ],
        )
        .await?;
        Ok(true)
    }

    async fn update_component(&self, component: &Component) -> Result<()> {
        self.execute(
            "update_component",
            "UPDATE components SET data = $1, type = $2, world_id = $3, source_entity_id = $4 WHERE id = $5 AND agent_id = $6",
            vec![
                component.data.clone().into(),
                component.component_type.clone().into(),
                component.world_id.into(),
                component.source_entity_id.into(),
                component.id.into(),
                self.agent_id.into(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn delete_component(&self, component_id: &UUID) -> Result<()> {
        self.execute(
            "delete_component",
            "DELETE FROM components WHERE id = $1 AND agent_id = $2",
            vec![(*component_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Memory Methods
    // =========================================================================

    async fn get_memories(&self, params: GetMemoriesParams) -> Result<Vec<Memory>> {
        let mut filters = Filters::new(vec![]);
        filters.and("m.type =", params.table_name.as_str());
        filters.and("m.agent_id =", self.agent_id);
        if let Some(room_id) = params.room_id {
            filters.and("m.room_id =", room_id);
        }
        if let Some(entity_id) = params.entity_id {
            filters.and("m.entity_id =", entity_id);
        }
        if let Some(world_id) = params.world_id {
            filters.and("m.world_id =", world_id);
        }
        if let Some(unique) = params.unique {
            filters.and("m.\"unique\" =", unique);
        }
        if let Some(start) = params.start {
            filters.and("m.created_at >=", timestamp_from_ms(start));
        }
        if let Some(end) = params.end {
            filters.and("m.created_at <=", timestamp_from_ms(end));
        }

        let sql = format!(
            "{} WHERE {} ORDER BY m.created_at DESC{}",
            self.memory_select(self.embedding_column()),
            filters.sql(),
            limit_offset(params.count, params.offset)
        );
        let records: Vec<MemoryRecord> = self.fetch_records("get_memories", &sql, filters.params).await?;
        Ok(records.iter().map(MemoryRecord::to_memory).collect())
    }

    async fn get_memory_by_id(&self, id: &UUID) -> Result<Option<Memory>> {
        let sql = format!(
            "{} WHERE m.id = $1 AND m.agent_id = $2 LIMIT 1",
            self.memory_select(self.embedding_column())
        );
        let record: Option<MemoryRecord> = self
            .fetch_record("get_memory_by_id", &sql, vec![(*id).into(), self.agent_id.into()])
            .await?;
        Ok(record.map(|r| r.to_memory()))
    }

    async fn get_memories_by_ids(
        &self,
        ids: &[UUID],
        table_name: Option<&str>,
    ) -> Result<Vec<Memory>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut filters = Filters::new(vec![]);
        let ids_param = filters.bind(ids.to_vec());
        filters.and_raw(format!("m.id = ANY({ids_param})"));
        filters.and("m.agent_id =", self.agent_id);
        if let Some(table) = table_name {
            filters.and("m.type =", table);
        }
        let sql = format!(
            "{} WHERE {} ORDER BY m.created_at DESC",
            self.memory_select(self.embedding_column()),
            filters.sql()
        );
        let records: Vec<MemoryRecord> =
            self.fetch_records("get_memories_by_ids", &sql, filters.params).await?;
        Ok(records.iter().map(MemoryRecord::to_memory).collect())
    }

    async fn get_memories_by_room_ids(
        &self,
        table_name: &str,
        room_ids: &[UUID],
        limit: Option<usize>,
    ) -> Result<Vec<Memory>> {
        if room_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE m.type = $1 AND m.agent_id = $2 AND m.room_id = ANY($3) ORDER BY m.created_at DESC{}",
            self.memory_select(self.embedding_column()),
            limit_offset(limit, None)
        );
        let records: Vec<MemoryRecord> = self
            .fetch_records(
                "get_memories_by_room_ids",
                &sql,
                vec![table_name.into(), self.agent_id.into(), room_ids.to_vec().into()],
            )
            .await?;
        Ok(records.iter().map(MemoryRecord::to_memory).collect())
    }

    async fn get_cached_embeddings(
        &self,
        params: GetCachedEmbeddingsParams,
    ) -> Result<Vec<EmbeddingSearchResult>> {
        if params.query_input.chars().count() > LEVENSHTEIN_MAX_LENGTH {
            debug!(
                length = params.query_input.chars().count(),
                "Cached embedding lookup input exceeds levenshtein limit"
            );
            return Ok(Vec::new());
        }

        let col = self.embedding_column().name();
        let sql = format!(
            r#"
            WITH content_text AS (
                SELECT m.id, COALESCE(m.content->$2::text->>$3::text, '') AS content_text
                FROM memories m
                WHERE m.type = $4 AND m.agent_id = $5 AND m.content->$2::text->>$3::text IS NOT NULL
            ),
            embedded_text AS (
                SELECT ct.content_text, e.{col}::text AS embedding
                FROM content_text ct
                JOIN embeddings e ON e.memory_id = ct.id
                WHERE e.{col} IS NOT NULL AND length(ct.content_text) <= {LEVENSHTEIN_MAX_LENGTH}
            )
            SELECT embedding, levenshtein($1, content_text)::bigint AS levenshtein_score
            FROM embedded_text
            WHERE levenshtein($1, content_text) <= $6
            ORDER BY levenshtein_score
            LIMIT $7
            "#
        );
        let sql_params = vec![
            params.query_input.clone().into(),
            params.query_field_name.clone().into(),
            params.query_field_sub_name.clone().into(),
            params.query_table_name.clone().into(),
            self.agent_id.into(),
            SqlValue::Int(Some(params.query_threshold as i64)),
            SqlValue::Int(Some(params.query_match_count as i64)),
        ];

        let mut rows: Vec<CachedEmbeddingRow> =
            match self.fetch_records("get_cached_embeddings", &sql, sql_params).await {
                Ok(rows) => rows,
                Err(e) if e.to_string().contains("exceeds maximum length") => {
                    debug!(error = %e, "Levenshtein input too long; returning no cached embeddings");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(e),
            };
        rows.sort_by_key(|row| row.levenshtein_score);

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.embedding.map(|embedding| EmbeddingSearchResult {
                    embedding,
                    levenshtein_score: row.levenshtein_score,
                })
            })
            .collect())
    }

    async fn search_memories(&self, params: SearchMemoriesParams) -> Result<Vec<Memory>> {
        let column = EmbeddingColumn::from_dimension(params.embedding.len())?;
        let mut query = SimilarityQuery::new(column, self.agent_id).table_name(params.table_name.as_str());
        if let Some(threshold) = params.match_threshold {
            query = query.threshold(threshold);
        }
        if let Some(room_id) = params.room_id {
            query = query.room(room_id);
        }
        if let Some(world_id) = params.world_id {
            query = query.world(world_id);
        }
        if let Some(entity_id) = params.entity_id {
            query = query.entity(entity_id);
        }
        if let Some(unique) = params.unique {
            query = query.unique(unique);
        }
        if let Some(count) = params.count {
            query = query.count(count);
        }

        let (sql, sql_params) = query.build(&params.embedding);
        let mut records: Vec<MemoryRecord> =
            self.fetch_records("search_memories", &sql, sql_params).await?;
        // the JSON row wrapper does not carry the inner ORDER BY
        records.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        Ok(records.iter().map(MemoryRecord::to_memory).collect())
    }

    async fn create_memory(
        &self,
        memory: &Memory,
        table_name: &str,
        unique: Option<bool>,
    ) -> Result<UUID> {
        let id = memory.id.unwrap_or_else(UUID::new_v4);
        let embedding = memory
            .embedding
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(sanitize_vector);

        let column = match &embedding {
            Some(vector) => Some(self.column_for(vector.len()).await?),
            None => None,
        };

        let is_unique = match (unique.or(memory.unique), &embedding) {
            (Some(explicit), _) => explicit,
            (None, Some(vector)) => {
                let similar = self
                    .search_memories(SearchMemoriesParams {
                        table_name: table_name.to_string(),
                        embedding: vector.clone(),
                        match_threshold: Some(DUPLICATE_SIMILARITY_THRESHOLD),
                        count: Some(1),
                        room_id: Some(memory.room_id),
                        ..Default::default()
                    })
                    .await?;
                similar.is_empty()
            }
            (None, None) => true,
        };

        let created_at = memory.created_at.map(timestamp_from_ms).unwrap_or_else(Utc::now);
        let metadata = memory
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::json!({}));

        let mut statements = vec![Statement::new(
            r#"
            INSERT INTO memories (id, type, content, entity_id, agent_id, room_id, world_id, "unique", metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
            vec![
                id.into(),
                table_name.into(),
                serde_json::to_value(&memory.content)?.into(),
                memory.entity_id.into(),
                self.agent_id.into(),
                memory.room_id.into(),
                memory.world_id.into(),
                is_unique.into(),
                metadata.into(),
                created_at.into(),
            ],
        )];
        if let (Some(vector), Some(column)) = (embedding, column) {
            statements.push(Statement::new(
                format!(
                    "INSERT INTO embeddings (memory_id, {col}) VALUES ($1, $2::vector) ON CONFLICT (memory_id) DO NOTHING",
                    col = column.name()
                ),
                vec![id.into(), SqlValue::Vector(vector)],
            ));
        }

        self.transaction("create_memory", statements).await?;
        debug!(memory_id = %id, table_name, unique = is_unique, "Created memory");
        Ok(id)
    }

    async fn update_memory(&self, memory: &Memory) -> Result<bool> {
        let Some(id) = memory.id else {
            return Ok(false);
        };
        let exists = self
            .fetch_all(
                "update_memory",
                "SELECT id FROM memories WHERE id = $1 AND agent_id = $2",
                vec![id.into(), self.agent_id.into()],
            )
            .await?;
        if exists.is_empty() {
            return Ok(false);
        }

        let mut statements = vec![Statement::new(
            "UPDATE memories SET content = $1, metadata = COALESCE($2, metadata) WHERE id = $3 AND agent_id = $4",
            vec![
                serde_json::to_value(&memory.content)?.into(),
                SqlValue::Json(memory.metadata.clone()),
                id.into(),
                self.agent_id.into(),
            ],
        )];
        if let Some(vector) = memory.embedding.as_deref().filter(|e| !e.is_empty()) {
            let vector = sanitize_vector(vector);
            let column = self.column_for(vector.len()).await?;
            statements.push(Statement::new(
                format!(
                    "INSERT INTO embeddings (memory_id, {col}) VALUES ($1, $2::vector) \
                     ON CONFLICT (memory_id) DO UPDATE SET {col} = EXCLUDED.{col}",
                    col = column.name()
                ),
                vec![id.into(), SqlValue::Vector(vector)],
            ));
        }
        self.transaction("update_memory", statements).await?;
        Ok(true)
    }

    async fn delete_memory(&self, memory_id: &UUID) -> Result<()> {
        self.transaction(
            "delete_memory",
            vec![
                Statement::new(
                    "DELETE FROM embeddings WHERE memory_id IN (SELECT id FROM memories WHERE id = $1 AND agent_id = $2)",
                    vec![(*memory_id).into(), self.agent_id.into()],
                ),
                Statement::new(
                    "DELETE FROM memories WHERE id = $1 AND agent_id = $2",
                    vec![(*memory_id).into(), self.agent_id.into()],
                ),
            ],
        )
        .await
    }

    async fn delete_many_memories(&self, memory_ids: &[UUID]) -> Result<()> {
        if memory_ids.is_empty() {
            return Ok(());
        }
        self.execute(
            "delete_many_memories",
            "DELETE FROM memories WHERE id = ANY($1) AND agent_id = $2",
            vec![memory_ids.to_vec().into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn delete_all_memories(&self, room_id: &UUID, table_name: &str) -> Result<()> {
        let deleted = self
            .execute(
                "delete_all_memories",
                "DELETE FROM memories WHERE room_id = $1 AND type = $2 AND agent_id = $3",
                vec![(*room_id).into(), table_name.into(), self.agent_id.into()],
            )
            .await?;
        debug!(room_id = %room_id, table_name, deleted, "Deleted room memories");
        Ok(())
    }

    async fn count_memories(
        &self,
        room_id: &UUID,
        unique: bool,
        table_name: Option<&str>,
    ) -> Result<i64> {
        let mut filters = Filters::new(vec![]);
        filters.and("room_id =", *room_id);
        filters.and("agent_id =", self.agent_id);
        if unique {
            filters.and_raw("\"unique\" = true");
        }
        if let Some(table) = table_name {
            filters.and("type =", table);
        }
        let sql = format!(
            "SELECT COUNT(*)::bigint AS count FROM memories WHERE {}",
            filters.sql()
        );
        self.count("count_memories", &sql, filters.params).await
    }

    async fn ensure_embedding_dimension(&self, dimension: usize) -> Result<()> {
        let column = EmbeddingColumn::from_dimension(dimension)?;
        if let Some(existing) = self.stored_dimension().await? {
            if existing != dimension {
                return Err(StorageError::DimensionMismatch {
                    existing,
                    requested: dimension,
                });
            }
        }
        *self.embedding_column.write() = Some(column);
        debug!(agent_id = %self.agent_id, dimension, column = column.name(), "Embedding dimension set");
        Ok(())
    }

    // =========================================================================
    // Log Methods
    // =========================================================================

    async fn log(&self, params: LogParams) -> Result<()> {
        self.execute(
            "log",
            "INSERT INTO logs (id, agent_id, entity_id, room_id, type, body) VALUES ($1, $2, $3, $4, $5, $6)",
            vec![
                UUID::new_v4().into(),
                self.agent_id.into(),
                params.entity_id.into(),
                params.room_id.into(),
                params.log_type.into(),
                params.body.into(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_logs(&self, params: GetLogsParams) -> Result<Vec<Log>> {
        let mut filters = Filters::new(vec![]);
        filters.and("agent_id =", self.agent_id);
        if let Some(entity_id) = params.entity_id {
            filters.and("entity_id =", entity_id);
        }
        if let Some(room_id) = params.room_id {
            filters.and("room_id =", room_id);
        }
        if let Some(log_type) = params.log_type {
            filters.and("type =", log_type);
        }
        let sql = format!(
            "SELECT id, entity_id, room_id, type, body, created_at FROM logs WHERE {} ORDER BY created_at DESC{}",
            filters.sql(),
            limit_offset(params.count, params.offset)
        );
        let records: Vec<LogRecord> = self.fetch_records("get_logs", &sql, filters.params).await?;
        Ok(records.iter().map(LogRecord::to_log).collect())
    }

    async fn delete_log(&self, log_id: &UUID) -> Result<()> {
        self.execute(
            "delete_log",
            "DELETE FROM logs WHERE id = $1 AND agent_id = $2",
            vec![(*log_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // World Methods
    // =========================================================================

    async fn create_world(&self, world: &World) -> Result<UUID> {
        self.execute(
            "create_world",
            "INSERT INTO worlds (id, name, agent_id, server_id, metadata) VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
            vec![
                world.id.into(),
                world.name.clone().into(),
                self.agent_id.into(),
                world.server_id.clone().into(),
                serde_json::to_value(&world.metadata)?.into(),
            ],
        )
        .await?;
        Ok(world.id)
    }

    async fn get_world(&self, id: &UUID) -> Result<Option<World>> {
        let record: Option<WorldRecord> = self
            .fetch_record(
                "get_world",
                "SELECT id, name, agent_id, server_id, metadata FROM worlds WHERE id = $1 AND agent_id = $2",
                vec![(*id).into(), self.agent_id.into()],
            )
            .await?;
        Ok(record.map(|r| r.to_world()))
    }

    async fn remove_world(&self, id: &UUID) -> Result<()> {
        self.execute(
            "remove_world",
            "DELETE FROM worlds WHERE id = $1 AND agent_id = $2",
            vec![(*id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn get_all_worlds(&self) -> Result<Vec<World>> {
        let records: Vec<WorldRecord> = self
            .fetch_records(
                "get_all_worlds",
                "SELECT id, name, agent_id, server_id, metadata FROM worlds WHERE agent_id = $1 ORDER BY created_at",
                vec![self.agent_id.into()],
            )
            .await?;
        Ok(records.iter().map(WorldRecord::to_world).collect())
    }

    async fn update_world(&self, world: &World) -> Result<()> {
        self.execute(
            "update_world",
            "UPDATE worlds SET name = $1, server_id = $2, metadata = $3 WHERE id = $4 AND agent_id = $5",
            vec![
                world.name.clone().into(),
                world.server_id.clone().into(),
                serde_json::to_value(&world.metadata)?.into(),
                world.id.into(),
                self.agent_id.into(),
            ],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Room Methods
    // =========================================================================

    async fn get_rooms_by_ids(&self, room_ids: &[UUID]) -> Result<Vec<Room>> {
        if room_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = ANY($1) AND agent_id = $2");
        let records: Vec<RoomRecord> = self
            .fetch_records("get_rooms_by_ids", &sql, vec![room_ids.to_vec().into(), self.agent_id.into()])
            .await?;
        Ok(records.iter().map(RoomRecord::to_room).collect())
    }

    async fn create_rooms(&self, rooms: &[Room]) -> Result<Vec<UUID>> {
        let statements = rooms
            .iter()
            .map(|room| {
                Ok(Statement::new(
                    r#"
                    INSERT INTO rooms (id, name, agent_id, source, type, channel_id, server_id, world_id, metadata)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    ON CONFLICT (id) DO NOTHING
                    "#,
                    self.room_params(room)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        self.transaction("create_rooms", statements).await?;
        Ok(rooms.iter().map(|r| r.id).collect())
    }

    async fn delete_room(&self, room_id: &UUID) -> Result<()> {
        self.execute(
            "delete_room",
            "DELETE FROM rooms WHERE id = $1 AND agent_id = $2",
            vec![(*room_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn delete_rooms_by_world_id(&self, world_id: &UUID) -> Result<()> {
        self.execute(
            "delete_rooms_by_world_id",
            "DELETE FROM rooms WHERE world_id = $1 AND agent_id = $2",
            vec![(*world_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn update_room(&self, room: &Room) -> Result<()> {
        let mut params = self.room_params(room)?;
        params[2] = self.agent_id.into();
        self.execute(
            "update_room",
            r#"
            UPDATE rooms SET name = $2, source = $4, type = $5, channel_id = $6, server_id = $7,
                world_id = $8, metadata = $9
            WHERE id = $1 AND agent_id = $3
            "#,
            params,
        )
        .await?;
        Ok(())
    }

    async fn get_rooms_by_world(&self, world_id: &UUID) -> Result<Vec<Room>> {
        let sql = format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE world_id = $1 AND agent_id = $2");
        let records: Vec<RoomRecord> = self
            .fetch_records("get_rooms_by_world", &sql, vec![(*world_id).into(), self.agent_id.into()])
            .await?;
        Ok(records.iter().map(RoomRecord::to_room).collect())
    }

    // =========================================================================
    // Participant Methods
    // =========================================================================

    async fn get_rooms_for_participant(&self, entity_id: &UUID) -> Result<Vec<UUID>> {
        let rows = self
            .fetch_all(
                "get_rooms_for_participant",
                "SELECT room_id FROM participants WHERE entity_id = $1 AND agent_id = $2",
                vec![(*entity_id).into(), self.agent_id.into()],
            )
            .await?;
        column_values(rows, "room_id")
    }

    async fn get_rooms_for_participants(&self, entity_ids: &[UUID]) -> Result<Vec<UUID>> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .fetch_all(
                "get_rooms_for_participants",
                "SELECT DISTINCT room_id FROM participants WHERE entity_id = ANY($1) AND agent_id = $2",
                vec![entity_ids.to_vec().into(), self.agent_id.into()],
            )
            .await?;
        column_values(rows, "room_id")
    }

    async fn remove_participant(&self, entity_id: &UUID, room_id: &UUID) -> Result<bool> {
        let deleted = self
            .execute(
                "remove_participant",
                "DELETE FROM participants WHERE entity_id = $1 AND room_id = $2 AND agent_id = $3",
                vec![(*entity_id).into(), (*room_id).into(), self.agent_id.into()],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn get_participants_for_entity(&self, entity_id: &UUID) -> Result<Vec<ParticipantInfo>> {
        let records: Vec<ParticipantRecord> = self
            .fetch_records(
                "get_participants_for_entity",
                "SELECT id, entity_id, room_id, agent_id, room_state FROM participants WHERE entity_id = $1 AND agent_id = $2",
                vec![(*entity_id).into(), self.agent_id.into()],
            )
            .await?;
        Ok(records
            .into_iter()
            .map(|r| ParticipantInfo {
                id: r.id,
                entity_id: r.entity_id,
                room_id: r.room_id,
                user_state: r.room_state,
            })
            .collect())
    }

    async fn get_participants_for_room(&self, room_id: &UUID) -> Result<Vec<UUID>> {
        let rows = self
            .fetch_all(
                "get_participants_for_room",
                "SELECT entity_id FROM participants WHERE room_id = $1 AND agent_id = $2",
                vec![(*room_id).into(), self.agent_id.into()],
            )
            .await?;
        column_values(rows, "entity_id")
    }

    async fn is_room_participant(&self, room_id: &UUID, entity_id: &UUID) -> Result<bool> {
        let rows = self
            .fetch_all(
                "is_room_participant",
                "SELECT 1 AS present FROM participants WHERE room_id = $1 AND entity_id = $2 AND agent_id = $3 LIMIT 1",
                vec![(*room_id).into(), (*entity_id).into(), self.agent_id.into()],
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn add_participants_room(&self, entity_ids: &[UUID], room_id: &UUID) -> Result<bool> {
        if entity_ids.is_empty() {
            return Ok(false);
        }
        let statements = entity_ids
            .iter()
            .map(|entity_id| {
                Statement::new(
                    "INSERT INTO participants (entity_id, room_id, agent_id) VALUES ($1, $2, $3) \
                     ON CONFLICT (entity_id, room_id, agent_id) DO NOTHING",
                    vec![(*entity_id).into(), (*room_id).into(), self.agent_id.into()],
                )
            })
            .collect();
        self.transaction("add_participants_room", statements).await?;
        Ok(true)
    }

    async fn get_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
    ) -> Result<Option<ParticipantUserState>> {
        let rows = self
            .fetch_all(
                "get_participant_user_state",
                "SELECT room_state FROM participants WHERE room_id = $1 AND entity_id = $2 AND agent_id = $3 LIMIT 1",
                vec![(*room_id).into(), (*entity_id).into(), self.agent_id.into()],
            )
            .await?;
        let states: Vec<Option<ParticipantUserState>> = column_values(rows, "room_state")?;
        Ok(states.into_iter().next().flatten())
    }

    async fn set_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
        state: Option<ParticipantUserState>,
    ) -> Result<()> {
        self.execute(
            "set_participant_user_state",
            "UPDATE participants SET room_state = $1 WHERE room_id = $2 AND entity_id = $3 AND agent_id = $4",
            vec![
                state.map(|s| s.as_str().to_string()).into(),
                (*room_id).into(),
                (*entity_id).into(),
                self.agent_id.into(),
            ],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Relationship Methods
    // =========================================================================

    async fn create_relationship(&self, params: CreateRelationshipParams) -> Result<bool> {
        self.execute(
            "create_relationship",
            r#"
            INSERT INTO relationships (id, source_entity_id, target_entity_id, agent_id, tags, metadata)
            VALUES ($1, $2, $3, $4, $5::text[], $6)
            ON CONFLICT (source_entity_id, target_entity_id, agent_id) DO NOTHING
            "#,
            vec![
                UUID::new_v4().into(),
                params.source_entity_id.into(),
                params.target_entity_id.into(),
                self.agent_id.into(),
                params.tags.unwrap_or_default().into(),
                serde_json::to_value(params.metadata.unwrap_or_default())?.into(),
            ],
        )
        .await?;
        Ok(true)
    }

    async fn update_relationship(&self, relationship: &Relationship) -> Result<()> {
        self.execute(
            "update_relationship",
            "UPDATE relationships SET tags = $1::text[], metadata = $2 WHERE id = $3 AND agent_id = $4",
            vec![
                relationship.tags.clone().into(),
                serde_json::to_value(&relationship.metadata)?.into(),
                relationship.id.into(),
                self.agent_id.into(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_relationship(
        &self,
        params: GetRelationshipParams,
    ) -> Result<Option<Relationship>> {
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships \
             WHERE source_entity_id = $1 AND target_entity_id = $2 AND agent_id = $3 LIMIT 1"
        );
        let record: Option<RelationshipRecord> = self
            .fetch_record(
                "get_relationship",
                &sql,
                vec![
                    params.source_entity_id.into(),
                    params.target_entity_id.into(),
                    self.agent_id.into(),
                ],
            )
            .await?;
        Ok(record.map(|r| r.to_relationship()))
    }

    async fn get_relationships(&self, params: GetRelationshipsParams) -> Result<Vec<Relationship>> {
        let mut filters = Filters::new(vec![params.entity_id.into()]);
        filters.and_raw("(source_entity_id = $1 OR target_entity_id = $1)");
        filters.and("agent_id =", self.agent_id);
        if let Some(tags) = params.tags.filter(|t| !t.is_empty()) {
            let placeholder = filters.bind(tags);
            filters.and_raw(format!("tags && {placeholder}::text[]"));
        }
        let sql = format!(
            "SELECT {RELATIONSHIP_COLUMNS} FROM relationships WHERE {} ORDER BY created_at",
            filters.sql()
        );
        let records: Vec<RelationshipRecord> =
            self.fetch_records("get_relationships", &sql, filters.params).await?;
        Ok(records.iter().map(RelationshipRecord::to_relationship).collect())
    }

    // =========================================================================
    // Goal Methods
    // =========================================================================

    async fn create_goal(&self, goal: &Goal) -> Result<UUID> {
        let id = goal.id.unwrap_or_else(UUID::new_v4);
        self.execute(
            "create_goal",
            r#"
            INSERT INTO goals (id, agent_id, entity_id, room_id, name, status, description, objectives)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
            vec![
                id.into(),
                self.agent_id.into(),
                goal.entity_id.into(),
                goal.room_id.into(),
                goal.name.clone().into(),
                goal.status.as_str().into(),
                goal.description.clone().into(),
                serde_json::to_value(&goal.objectives)?.into(),
            ],
        )
        .await?;
        Ok(id)
    }

    async fn get_goals(&self, params: GetGoalsParams) -> Result<Vec<Goal>> {
        let mut filters = Filters::new(vec![]);
        filters.and("room_id =", params.room_id);
        filters.and("agent_id =", self.agent_id);
        if let Some(entity_id) = params.entity_id {
            filters.and("entity_id =", entity_id);
        }
        if params.only_in_progress {
            filters.and("status =", GoalStatus::InProgress.as_str());
        }
        let sql = format!(
            "SELECT {GOAL_COLUMNS} FROM goals WHERE {} ORDER BY created_at{}",
            filters.sql(),
            limit_offset(params.count, None)
        );
        let records: Vec<GoalRecord> = self.fetch_records("get_goals", &sql, filters.params).await?;
        Ok(records.iter().map(GoalRecord::to_goal).collect())
    }

    async fn update_goal(&self, goal: &Goal) -> Result<()> {
        let id = goal.id.ok_or_else(|| StorageError::NotFound {
            entity: "goal",
            id: "<unsaved>".to_string(),
        })?;
        self.execute(
            "update_goal",
            "UPDATE goals SET name = $1, status = $2, description = $3, objectives = $4 WHERE id = $5 AND agent_id = $6",
            vec![
                goal.name.clone().into(),
                goal.status.as_str().into(),
                goal.description.clone().into(),
                serde_json::to_value(&goal.objectives)?.into(),
                id.into(),
                self.agent_id.into(),
            ],
        )
        .await?;
        Ok(())
    }

    async fn update_goal_status(&self, goal_id: &UUID, status: GoalStatus) -> Result<()> {
        self.execute(
            "update_goal_status",
            "UPDATE goals SET status = $1 WHERE id = $2 AND agent_id = $3",
            vec![status.as_str().into(), (*goal_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn remove_goal(&self, goal_id: &UUID) -> Result<()> {
        self.execute(
            "remove_goal",
            "DELETE FROM goals WHERE id = $1 AND agent_id = $2",
            vec![(*goal_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    async fn remove_all_goals(&self, room_id: &UUID) -> Result<()> {
        self.execute(
            "remove_all_goals",
            "DELETE FROM goals WHERE room_id = $1 AND agent_id = $2",
            vec![(*room_id).into(), self.agent_id.into()],
        )
        .await?;
        Ok(())
    }

    // =========================================================================
    // Cache Methods
    // =========================================================================

    async fn get_cache(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let record: Option<CacheRecord> = self
            .fetch_record(
                "get_cache",
                "SELECT key, agent_id, value, created_at, expires_at FROM cache WHERE key = $1 AND agent_id = $2",
                vec![key.into(), self.agent_id.into()],
            )
            .await?;
        Ok(record.filter(|r| !r.is_expired()).map(|r| r.value))
    }

    async fn set_cache(
        &self,
        key: &str,
        value: &serde_json::Value,
        expires_at: Option<i64>,
    ) -> Result<bool> {
        self.execute(
            "set_cache",
            r#"
            INSERT INTO cache (key, agent_id, value, expires_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key, agent_id) DO UPDATE
            SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at, created_at = now()
            "#,
            vec![
                key.into(),
                self.agent_id.into(),
                value.clone().into(),
                SqlValue::Timestamp(expires_at.map(timestamp_from_ms)),
            ],
        )
        .await?;
        Ok(true)
    }

    async fn delete_cache(&self, key: &str) -> Result<bool> {
        let deleted = self
            .execute(
                "delete_cache",
                "DELETE FROM cache WHERE key = $1 AND agent_id = $2",
                vec![key.into(), self.agent_id.into()],
            )
            .await?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::DatabaseKind;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Records every statement; answers the dimension probe and similarity searches
    #[derive(Default)]
    struct ScriptedExecutor {
        stored_dimension: Mutex<Option<usize>>,
        search_rows: Mutex<Vec<Row>>,
        calls: Mutex<Vec<Statement>>,
    }

    impl ScriptedExecutor {
        fn with_stored_dimension(dimension: usize) -> Self {
            let executor = Self::default();
            *executor.stored_dimension.lock() = Some(dimension);
            executor
        }

        fn calls_containing(&self, fragment: &str) -> Vec<Statement> {
            self.calls
                .lock()
                .iter()
                .filter(|s| s.sql.contains(fragment))
                .cloned()
                .collect()
        }
    }

    #[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
    #[cfg_attr(not(target_arch = "wasm32"), async_trait)]
    impl SqlExecutor for ScriptedExecutor {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Server
        }

        async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
            self.calls.lock().push(Statement::new(sql, params.to_vec()));
            Ok(0)
        }

        async fn fetch_all(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>> {
            self.calls.lock().push(Statement::new(sql, params.to_vec()));
            if sql.contains("AS dimension") {
                return Ok(self
                    .stored_dimension
                    .lock()
                    .map(|d| json!({ "dimension": d }).as_object().cloned().unwrap())
                    .into_iter()
                    .collect());
            }
            if sql.contains("<=>") {
                return Ok(self.search_rows.lock().clone());
            }
            Ok(Vec::new())
        }

        async fn transaction(&self, statements: &[Statement]) -> Result<()> {
            for statement in statements {
                for column in EmbeddingColumn::ALL {
                    if statement.sql.contains(&format!("(memory_id, {})", column.name())) {
                        *self.stored_dimension.lock() = Some(column.dimension());
                    }
                }
                self.calls.lock().push(statement.clone());
            }
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn scripted_adapter(executor: &Arc<ScriptedExecutor>) -> SqlDatabaseAdapter {
        SqlDatabaseAdapter::new(executor.clone(), UUID::new_v4(), &DatabaseConfig::default())
    }

    fn memory_row(agent_id: UUID, room_id: UUID, similarity: f32) -> Row {
        json!({
            "id": UUID::new_v4(),
            "type": "messages",
            "created_at": "2024-01-01T00:00:00Z",
            "content": { "text": format!("stored at {similarity}") },
            "entity_id": agent_id,
            "agent_id": agent_id,
            "room_id": room_id,
            "world_id": null,
            "unique": true,
            "metadata": {},
            "embedding": null,
            "similarity": similarity
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    /// The `"unique"` parameter of every memory insert, in order
    fn inserted_unique_flags(executor: &ScriptedExecutor) -> Vec<SqlValue> {
        executor
            .calls_containing("INSERT INTO memories")
            .into_iter()
            .map(|s| s.params[7].clone())
            .collect()
    }

    #[tokio::test]
    async fn test_init_reads_with_stored_dimension() {
        let executor = Arc::new(ScriptedExecutor::with_stored_dimension(768));
        let adapter = scripted_adapter(&executor);

        adapter.init().await.unwrap();
        assert_eq!(adapter.embedding_column(), EmbeddingColumn::Dim768);

        adapter
            .get_memories(GetMemoriesParams {
                table_name: "messages".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        let reads = executor.calls_containing("FROM memories m");
        let last = reads.last().unwrap();
        assert!(last.sql.contains("e.dim768::text AS embedding"), "{}", last.sql);
    }

    #[tokio::test]
    async fn test_init_without_embeddings_keeps_default_column() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);

        adapter.init().await.unwrap();
        assert_eq!(adapter.embedding_column(), EmbeddingColumn::Dim384);
        assert_eq!(executor.calls_containing("AS dimension").len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_dimension_stays_fixed_per_agent() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);
        let room_id = UUID::new_v4();
        let message = |text: &str, dimension: usize| {
            Memory::message(adapter.agent_id(), room_id, text).with_embedding(vec![0.1; dimension])
        };

        adapter
            .create_memory(&message("first", 384), "messages", Some(true))
            .await
            .unwrap();

        let err = adapter
            .create_memory(&message("wider", 768), "messages", Some(true))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err.root(),
                StorageError::DimensionMismatch {
                    existing: 384,
                    requested: 768
                }
            ),
            "{err}"
        );

        adapter
            .create_memory(&message("second", 384), "messages", Some(true))
            .await
            .unwrap();

        assert_eq!(*executor.stored_dimension.lock(), Some(384));
        assert_eq!(executor.calls_containing("INSERT INTO embeddings").len(), 2);
        assert!(executor.calls_containing("dim768)").is_empty());
        assert_eq!(inserted_unique_flags(&executor).len(), 2);
    }

    #[tokio::test]
    async fn test_similar_memory_is_stored_as_not_unique() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);
        let room_id = UUID::new_v4();
        *executor.search_rows.lock() = vec![memory_row(adapter.agent_id(), room_id, 0.97)];

        let repeat = Memory::message(adapter.agent_id(), room_id, "hello again")
            .with_embedding(vec![0.1; 384]);
        adapter.create_memory(&repeat, "messages", None).await.unwrap();

        let searches = executor.calls_containing("<=>");
        assert_eq!(searches.len(), 1);
        let search = &searches[0];
        assert!(search.sql.contains("LIMIT 1"), "{}", search.sql);
        assert!(search
            .params
            .contains(&SqlValue::Float(Some(f64::from(DUPLICATE_SIMILARITY_THRESHOLD)))));
        assert!(search.params.contains(&SqlValue::Uuid(Some(room_id))));

        executor.search_rows.lock().clear();
        let fresh = Memory::message(adapter.agent_id(), room_id, "something new")
            .with_embedding(vec![0.2; 384]);
        adapter.create_memory(&fresh, "messages", None).await.unwrap();

        assert_eq!(
            inserted_unique_flags(&executor),
            vec![SqlValue::Bool(Some(false)), SqlValue::Bool(Some(true))]
        );
    }

    #[tokio::test]
    async fn test_explicit_unique_flag_skips_duplicate_search() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);
        let memory = Memory::message(adapter.agent_id(), UUID::new_v4(), "pinned")
            .with_embedding(vec![0.1; 384]);

        adapter.create_memory(&memory, "messages", Some(false)).await.unwrap();

        assert!(executor.calls_containing("<=>").is_empty());
        assert_eq!(inserted_unique_flags(&executor), vec![SqlValue::Bool(Some(false))]);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity_and_sanitizes_query() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);
        let room_id = UUID::new_v4();
        *executor.search_rows.lock() = vec![
            memory_row(adapter.agent_id(), room_id, 0.80),
            memory_row(adapter.agent_id(), room_id, 0.95),
        ];

        let mut query = vec![0.0; 384];
        query[0] = 1.0;
        query[1] = f32::NAN;
        query[2] = f32::INFINITY;
        let results = adapter
            .search_memories(SearchMemoriesParams {
                table_name: "messages".to_string(),
                embedding: query,
                match_threshold: Some(0.70),
                room_id: Some(room_id),
                ..Default::default()
            })
            .await
            .unwrap();

        let similarities: Vec<f32> = results.iter().filter_map(|m| m.similarity).collect();
        assert_eq!(similarities, vec![0.95, 0.80]);

        let search = executor.calls_containing("<=>").remove(0);
        match &search.params[0] {
            SqlValue::Vector(values) => {
                assert!(values.iter().all(|v| v.is_finite()));
                assert_eq!(&values[..3], &[1.0, 0.0, 0.0]);
            }
            other => panic!("expected the query vector first, got {other:?}"),
        }
    }

    fn cached_params(input: String) -> GetCachedEmbeddingsParams {
        GetCachedEmbeddingsParams {
            query_table_name: "messages".to_string(),
            query_threshold: 2,
            query_input: input,
            query_field_name: "content".to_string(),
            query_field_sub_name: "text".to_string(),
            query_match_count: 10,
        }
    }

    #[tokio::test]
    async fn test_over_length_cached_lookup_sends_no_query() {
        let executor = Arc::new(ScriptedExecutor::default());
        let adapter = scripted_adapter(&executor);

        let results = adapter
            .get_cached_embeddings(cached_params("x".repeat(LEVENSHTEIN_MAX_LENGTH + 45)))
            .await
            .unwrap();
        assert!(results.is_empty());
        assert!(executor.calls.lock().is_empty());

        adapter
            .get_cached_embeddings(cached_params("x".repeat(LEVENSHTEIN_MAX_LENGTH)))
            .await
            .unwrap();
        assert_eq!(executor.calls_containing("levenshtein").len(), 1);
    }

    #[test]
    fn test_filters_number_placeholders_in_order() {
        let mut filters = Filters::new(vec![UUID::nil().into()]);
        filters.and_raw("(source_entity_id = $1 OR target_entity_id = $1)");
        filters.and("agent_id =", UUID::nil());
        let tags = filters.bind(vec!["friend".to_string()]);
        filters.and_raw(format!("tags && {tags}::text[]"));

        assert_eq!(
            filters.sql(),
            "(source_entity_id = $1 OR target_entity_id = $1) AND agent_id = $2 AND tags && $3::text[]"
        );
        assert_eq!(filters.params.len(), 3);
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(limit_offset(None, None), "");
        assert_eq!(limit_offset(Some(5), Some(0)), " LIMIT 5");
        assert_eq!(limit_offset(Some(5), Some(10)), " LIMIT 5 OFFSET 10");
    }

    #[test]
    fn test_column_values() {
        let id = UUID::new_v4();
        let rows = vec![serde_json::json!({"room_id": id})
            .as_object()
            .cloned()
            .unwrap()];
        let ids: Vec<UUID> = column_values(rows, "room_id").unwrap();
        assert_eq!(ids, vec![id]);
    }
}
