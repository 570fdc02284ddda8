#![allow(missing_docs)]
//! The storage API consumed by the agent runtime.

use async_trait::async_trait;

use crate::error::Result;
use crate::migration::{ExtensionSchema, MigrationReport};
use crate::schema::ParticipantUserState;
use crate::types::{
    Agent, Character, Component, Entity, Goal, GoalStatus, Log, Memory, Metadata, Relationship,
    Room, World, UUID,
};

#[derive(Clone, Debug, Default)]
pub struct GetMemoriesParams {
    pub table_name: String,
    pub room_id: Option<UUID>,
    pub entity_id: Option<UUID>,
    pub world_id: Option<UUID>,
    /// Defaults to every matching row
    pub count: Option<usize>,
    pub offset: Option<usize>,
    pub unique: Option<bool>,
    /// Inclusive creation-time bounds, milliseconds since the epoch
    pub start: Option<i64>,
    pub end: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct SearchMemoriesParams {
    pub table_name: String,
    pub embedding: Vec<f32>,
    /// Minimum cosine similarity, inclusive
    pub match_threshold: Option<f32>,
    /// Defaults to 10
    pub count: Option<usize>,
    pub unique: Option<bool>,
    pub room_id: Option<UUID>,
    pub world_id: Option<UUID>,
    pub entity_id: Option<UUID>,
}

/// Fuzzy lookup of previously embedded text
#[derive(Clone, Debug)]
pub struct GetCachedEmbeddingsParams {
    pub query_table_name: String,
    /// Maximum edit distance
    pub query_threshold: usize,
    pub query_input: String,
    /// Top-level key of `content` holding the text
    pub query_field_name: String,
    /// Key under `query_field_name`; the text is read from `content->field->sub_field`
    pub query_field_sub_name: String,
    pub query_match_count: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EmbeddingSearchResult {
    pub embedding: Vec<f32>,
    pub levenshtein_score: i64,
}

#[derive(Clone, Debug)]
pub struct LogParams {
    pub body: serde_json::Value,
    pub entity_id: UUID,
    pub room_id: Option<UUID>,
    pub log_type: String,
}

#[derive(Clone, Debug, Default)]
pub struct GetLogsParams {
    pub entity_id: Option<UUID>,
    pub room_id: Option<UUID>,
    pub log_type: Option<String>,
    pub count: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct CreateRelationshipParams {
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Metadata>,
}

#[derive(Clone, Debug)]
pub struct GetRelationshipParams {
    pub source_entity_id: UUID,
    pub target_entity_id: UUID,
}

#[derive(Clone, Debug, Default)]
pub struct GetRelationshipsParams {
    pub entity_id: UUID,
    /// Matches relationships sharing at least one tag
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct GetGoalsParams {
    pub room_id: UUID,
    pub entity_id: Option<UUID>,
    pub only_in_progress: bool,
    pub count: Option<usize>,
}

/// Participant row as seen from an entity
#[derive(Clone, Debug, PartialEq)]
pub struct ParticipantInfo {
    pub id: UUID,
    pub entity_id: UUID,
    pub room_id: UUID,
    pub user_state: Option<ParticipantUserState>,
}

/// Database adapter interface
///
/// Everything the agent runtime reads or writes goes through this trait.
/// Implementations scope every query to one agent.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait DatabaseAdapter: Send + Sync {
    // =========================================================================
    // Core Methods
    // =========================================================================

    /// Migrate the core tables and apply the configured embedding dimension
    async fn init(&self) -> Result<()>;

    async fn is_ready(&self) -> Result<bool>;

    async fn close(&self) -> Result<()>;

    /// Migrate extension schemas in order, stopping at the first fatal failure
    async fn run_plugin_migrations(
        &self,
        schemas: &[ExtensionSchema],
    ) -> Result<Vec<MigrationReport>>;

    // =========================================================================
    // Agent Methods
    // =========================================================================

    async fn get_agent(&self, agent_id: &UUID) -> Result<Option<Agent>>;

    async fn get_agents(&self) -> Result<Vec<Agent>>;

    /// Create an agent together with its own entity
    async fn create_agent(&self, agent: &Agent) -> Result<bool>;

    async fn update_agent(&self, agent_id: &UUID, agent: &Agent) -> Result<bool>;

    /// Delete an agent; every row it owns goes with it
    async fn delete_agent(&self, agent_id: &UUID) -> Result<bool>;

    // =========================================================================
    // Character Methods
    // =========================================================================

    async fn create_character(&self, character: &Character) -> Result<UUID>;

    async fn get_character(&self, id: &UUID) -> Result<Option<Character>>;

    async fn get_character_by_name(&self, name: &str) -> Result<Option<Character>>;

    async fn list_characters(&self) -> Result<Vec<Character>>;

    async fn update_character(&self, id: &UUID, character: &Character) -> Result<bool>;

    async fn delete_character(&self, id: &UUID) -> Result<bool>;

    // =========================================================================
    // Entity Methods
    // =========================================================================

    async fn get_entities_by_ids(&self, entity_ids: &[UUID]) -> Result<Vec<Entity>>;

    /// Get entities participating in a room
    async fn get_entities_for_room(
        &self,
        room_id: &UUID,
        include_components: bool,
    ) -> Result<Vec<Entity>>;

    async fn create_entities(&self, entities: &[Entity]) -> Result<bool>;

    async fn update_entity(&self, entity: &Entity) -> Result<()>;

    async fn delete_entity(&self, entity_id: &UUID) -> Result<()>;

    // =========================================================================
    // Component Methods
    // =========================================================================

    async fn get_component(
        &self,
        entity_id: &UUID,
        component_type: &str,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> Result<Option<Component>>;

    async fn get_components(
        &self,
        entity_id: &UUID,
        world_id: Option<&UUID>,
        source_entity_id: Option<&UUID>,
    ) -> Result<Vec<Component>>;

    async fn create_component(&self, component: &Component) -> Result<bool>;

    async fn update_component(&self, component: &Component) -> Result<()>;

    async fn delete_component(&self, component_id: &UUID) -> Result<()>;

    // =========================================================================
    // Memory Methods
    // =========================================================================

    async fn get_memories(&self, params: GetMemoriesParams) -> Result<Vec<Memory>>;

    async fn get_memory_by_id(&self, id: &UUID) -> Result<Option<Memory>>;

    async fn get_memories_by_ids(
        &self,
        ids: &[UUID],
        table_name: Option<&str>,
    ) -> Result<Vec<Memory>>;

    async fn get_memories_by_room_ids(
        &self,
        table_name: &str,
        room_ids: &[UUID],
        limit: Option<usize>,
    ) -> Result<Vec<Memory>>;

    /// Find embeddings of stored texts close to `query_input` by edit distance
    async fn get_cached_embeddings(
        &self,
        params: GetCachedEmbeddingsParams,
    ) -> Result<Vec<EmbeddingSearchResult>>;

    /// Cosine-similarity search over this agent's memories
    async fn search_memories(&self, params: SearchMemoriesParams) -> Result<Vec<Memory>>;

    /// Create a memory; `unique` of `None` is decided by a similarity check
    async fn create_memory(
        &self,
        memory: &Memory,
        table_name: &str,
        unique: Option<bool>,
    ) -> Result<UUID>;

    async fn update_memory(&self, memory: &Memory) -> Result<bool>;

    async fn delete_memory(&self, memory_id: &UUID) -> Result<()>;

    async fn delete_many_memories(&self, memory_ids: &[UUID]) -> Result<()>;

    async fn delete_all_memories(&self, room_id: &UUID, table_name: &str) -> Result<()>;

    async fn count_memories(
        &self,
        room_id: &UUID,
        unique: bool,
        table_name: Option<&str>,
    ) -> Result<i64>;

    /// Fix the agent's embedding dimension, refusing a change once embeddings exist
    async fn ensure_embedding_dimension(&self, dimension: usize) -> Result<()>;

    // =========================================================================
    // Log Methods
    // =========================================================================

    async fn log(&self, params: LogParams) -> Result<()>;

    async fn get_logs(&self, params: GetLogsParams) -> Result<Vec<Log>>;

    async fn delete_log(&self, log_id: &UUID) -> Result<()>;

    // =========================================================================
    // World Methods
    // =========================================================================

    async fn create_world(&self, world: &World) -> Result<UUID>;

    async fn get_world(&self, id: &UUID) -> Result<Option<World>>;

    async fn remove_world(&self, id: &UUID) -> Result<()>;

    async fn get_all_worlds(&self) -> Result<Vec<World>>;

    async fn update_world(&self, world: &World) -> Result<()>;

    // =========================================================================
    // Room Methods
    // =========================================================================

    async fn get_rooms_by_ids(&self, room_ids: &[UUID]) -> Result<Vec<Room>>;

    async fn create_rooms(&self, rooms: &[Room]) -> Result<Vec<UUID>>;

    async fn delete_room(&self, room_id: &UUID) -> Result<()>;

    async fn delete_rooms_by_world_id(&self, world_id: &UUID) -> Result<()>;

    async fn update_room(&self, room: &Room) -> Result<()>;

    async fn get_rooms_by_world(&self, world_id: &UUID) -> Result<Vec<Room>>;

    // =========================================================================
    // Participant Methods
    // =========================================================================

    async fn get_rooms_for_participant(&self, entity_id: &UUID) -> Result<Vec<UUID>>;

    async fn get_rooms_for_participants(&self, entity_ids: &[UUID]) -> Result<Vec<UUID>>;

    async fn remove_participant(&self, entity_id: &UUID, room_id: &UUID) -> Result<bool>;

    async fn get_participants_for_entity(&self, entity_id: &UUID) -> Result<Vec<ParticipantInfo>>;

    async fn get_participants_for_room(&self, room_id: &UUID) -> Result<Vec<UUID>>;

    async fn is_room_participant(&self, room_id: &UUID, entity_id: &UUID) -> Result<bool>;

    async fn add_participants_room(&self, entity_ids: &[UUID], room_id: &UUID) -> Result<bool>;

    async fn get_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
    ) -> Result<Option<ParticipantUserState>>;

    async fn set_participant_user_state(
        &self,
        room_id: &UUID,
        entity_id: &UUID,
        state: Option<ParticipantUserState>,
    ) -> Result<()>;

    // =========================================================================
    // Relationship Methods
    // =========================================================================

    async fn create_relationship(&self, params: CreateRelationshipParams) -> Result<bool>;

    async fn update_relationship(&self, relationship: &Relationship) -> Result<()>;

    async fn get_relationship(&self, params: GetRelationshipParams)
        -> Result<Option<Relationship>>;

    async fn get_relationships(&self, params: GetRelationshipsParams) -> Result<Vec<Relationship>>;

    // =========================================================================
    // Goal Methods
    // =========================================================================

    async fn create_goal(&self, goal: &Goal) -> Result<UUID>;

    async fn get_goals(&self, params: GetGoalsParams) -> Result<Vec<Goal>>;

    async fn update_goal(&self, goal: &Goal) -> Result<()>;

    async fn update_goal_status(&self, goal_id: &UUID, status: GoalStatus) -> Result<()>;

    async fn remove_goal(&self, goal_id: &UUID) -> Result<()>;

    async fn remove_all_goals(&self, room_id: &UUID) -> Result<()>;

    // =========================================================================
    // Cache Methods
    // =========================================================================

    /// Get a cached value; expired entries read as absent
    async fn get_cache(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Set a cached value, optionally expiring at `expires_at` (ms since the epoch)
    async fn set_cache(
        &self,
        key: &str,
        value: &serde_json::Value,
        expires_at: Option<i64>,
    ) -> Result<bool>;

    async fn delete_cache(&self, key: &str) -> Result<bool>;
}
