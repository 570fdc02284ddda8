//! Integration tests for the elizaOS persistence core
//!
//! These run against PostgreSQL with pgvector and fuzzystrmatch at
//! `DATABASE_URL` and are skipped when no database is reachable.

#![cfg(feature = "native")]

use pretty_assertions::assert_eq;
use std::sync::Arc;
use tokio::sync::OnceCell;

use elizaos_persistence::base::{
    CreateRelationshipParams, GetCachedEmbeddingsParams, GetRelationshipsParams,
    SearchMemoriesParams,
};
use elizaos_persistence::postgres::PostgresConnectionManager;
use elizaos_persistence::retry::RetryConfig;
use elizaos_persistence::schema::core_extension;
use elizaos_persistence::types::{Agent, Character, Entity, Memory, Room, UUID};
use elizaos_persistence::{DatabaseAdapter, DatabaseConfig, SqlDatabaseAdapter, StorageError};

static MIGRATED: OnceCell<()> = OnceCell::const_new();

async fn setup() -> Option<(SqlDatabaseAdapter, UUID)> {
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/eliza_test".to_string());

    let manager = match PostgresConnectionManager::new(&database_url, 5).await {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Skipping test - database not available: {}", e);
            return None;
        }
    };

    let mut config = DatabaseConfig::postgres(database_url);
    config.retry = RetryConfig::immediate(1);

    let agent_id = UUID::new_v4();
    let adapter = SqlDatabaseAdapter::new(Arc::new(manager), agent_id, &config);

    // concurrent first-time CREATE TABLEs race on the catalog
    MIGRATED
        .get_or_try_init(|| adapter.init())
        .await
        .expect("Failed to migrate core tables");

    let agent = Agent::from_character(agent_id, Character::new(format!("agent-{agent_id}")));
    assert!(adapter.create_agent(&agent).await.expect("Failed to create agent"));

    let room_id = UUID::new_v4();
    adapter
        .create_rooms(&[Room {
            id: room_id,
            name: Some("general".to_string()),
            agent_id: None,
            source: "test".to_string(),
            room_type: "GROUP".to_string(),
            channel_id: None,
            server_id: None,
            world_id: None,
            metadata: Default::default(),
        }])
        .await
        .expect("Failed to create room");

    Some((adapter, room_id))
}

async fn teardown(adapter: &SqlDatabaseAdapter) {
    adapter
        .delete_agent(&adapter.agent_id())
        .await
        .expect("Failed to delete agent");
}

/// Unit vector whose cosine similarity to `e0` is `cos`
fn vector_at(cos: f32, dimension: usize) -> Vec<f32> {
    let mut v = vec![0.0; dimension];
    v[0] = cos;
    v[1] = (1.0 - cos * cos).sqrt();
    v
}

fn message(adapter: &SqlDatabaseAdapter, room_id: UUID, text: &str) -> Memory {
    Memory::message(adapter.agent_id(), room_id, text)
}

#[tokio::test]
async fn test_embedding_dimension_is_exclusive() {
    let Some((adapter, room_id)) = setup().await else {
        return;
    };

    let first = message(&adapter, room_id, "first").with_embedding(vector_at(1.0, 384));
    adapter
        .create_memory(&first, "messages", Some(true))
        .await
        .expect("384 insert should succeed");

    let wider = message(&adapter, room_id, "wider").with_embedding(vector_at(1.0, 768));
    let err = adapter
        .create_memory(&wider, "messages", Some(true))
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

    let second = message(&adapter, room_id, "second").with_embedding(vector_at(0.5, 384));
    adapter
        .create_memory(&second, "messages", Some(true))
        .await
        .expect("second 384 insert should succeed");

    assert_eq!(adapter.count_memories(&room_id, false, Some("messages")).await.unwrap(), 2);
    teardown(&adapter).await;
}

#[tokio::test]
async fn test_similarity_search_orders_and_thresholds() {
    let Some((adapter, room_id)) = setup().await else {
        return;
    };

    for (cos, text) in [(0.60, "far"), (0.95, "close"), (0.80, "middle")] {
        let memory = message(&adapter, room_id, text).with_embedding(vector_at(cos, 384));
        adapter
            .create_memory(&memory, "messages", Some(true))
            .await
            .unwrap();
    }

    let results = adapter
        .search_memories(SearchMemoriesParams {
            table_name: "messages".to_string(),
            embedding: vector_at(1.0, 384),
            match_threshold: Some(0.70),
            count: Some(10),
            room_id: Some(room_id),
            ..Default::default()
        })
        .await
        .unwrap();

    let texts: Vec<_> = results
        .iter()
        .map(|m| m.content.text.clone().unwrap_or_default())
        .collect();
    assert_eq!(texts, vec!["close", "middle"]);
    let similarities: Vec<f32> = results.iter().filter_map(|m| m.similarity).collect();
    assert!((similarities[0] - 0.95).abs() < 1e-3, "{similarities:?}");
    assert!((similarities[1] - 0.80).abs() < 1e-3, "{similarities:?}");

    teardown(&adapter).await;
}

#[tokio::test]
async fn test_search_accepts_non_finite_components() {
    let Some((adapter, room_id)) = setup().await else {
        return;
    };

    let memory = message(&adapter, room_id, "stored").with_embedding(vector_at(1.0, 384));
    adapter
        .create_memory(&memory, "messages", Some(true))
        .await
        .unwrap();

    let mut query = vector_at(1.0, 384);
    query[2] = f32::NAN;
    query[3] = f32::INFINITY;
    query[4] = f32::NEG_INFINITY;

    let results = adapter
        .search_memories(SearchMemoriesParams {
            table_name: "messages".to_string(),
            embedding: query,
            room_id: Some(room_id),
            ..Default::default()
        })
        .await
        .expect("non-finite components are treated as zero");
    assert_eq!(results.len(), 1);
    assert!(results[0].similarity.unwrap() > 0.999);

    teardown(&adapter).await;
}

#[tokio::test]
async fn test_duplicate_memory_is_not_unique() {
    let Some((adapter, room_id)) = setup().await else {
        return;
    };

    let original = message(&adapter, room_id, "hello").with_embedding(vector_at(1.0, 384));
    adapter.create_memory(&original, "messages", None).await.unwrap();
    let repeat = message(&adapter, room_id, "hello again").with_embedding(vector_at(1.0, 384));
    let repeat_id = adapter.create_memory(&repeat, "messages", None).await.unwrap();

    let stored = adapter.get_memory_by_id(&repeat_id).await.unwrap().unwrap();
    assert_eq!(stored.unique, Some(false));
    assert_eq!(adapter.count_memories(&room_id, true, Some("messages")).await.unwrap(), 1);

    teardown(&adapter).await;
}

#[tokio::test]
async fn test_cache_is_keyed_per_agent() {
    let Some((first, _)) = setup().await else {
        return;
    };
    let Some((second, _)) = setup().await else {
        return;
    };

    let key = format!("settings-{}", UUID::new_v4());
    assert!(first.set_cache(&key, &serde_json::json!({"v": 1}), None).await.unwrap());
    assert!(second.set_cache(&key, &serde_json::json!({"v": 2}), None).await.unwrap());

    assert_eq!(first.get_cache(&key).await.unwrap(), Some(serde_json::json!({"v": 1})));
    assert_eq!(second.get_cache(&key).await.unwrap(), Some(serde_json::json!({"v": 2})));

    // upsert, then expiry
    first.set_cache(&key, &serde_json::json!({"v": 3}), None).await.unwrap();
    assert_eq!(first.get_cache(&key).await.unwrap(), Some(serde_json::json!({"v": 3})));
    first
        .set_cache(&key, &serde_json::json!({"v": 4}), Some(1))
        .await
        .unwrap();
    assert_eq!(first.get_cache(&key).await.unwrap(), None);

    assert!(second.delete_cache(&key).await.unwrap());
    assert_eq!(second.get_cache(&key).await.unwrap(), None);

    teardown(&first).await;
    teardown(&second).await;
}

#[tokio::test]
async fn test_relationship_tags_overlap() {
    let Some((adapter, _)) = setup().await else {
        return;
    };

    let alice = Entity::new(UUID::new_v4(), adapter.agent_id(), vec!["alice".to_string()]);
    let bob = Entity::new(UUID::new_v4(), adapter.agent_id(), vec!["bob".to_string()]);
    assert!(adapter.create_entities(&[alice.clone(), bob.clone()]).await.unwrap());

    adapter
        .create_relationship(CreateRelationshipParams {
            source_entity_id: alice.id,
            target_entity_id: bob.id,
            tags: Some(vec!["friend".to_string(), "colleague".to_string()]),
            metadata: None,
        })
        .await
        .unwrap();

    let overlapping = adapter
        .get_relationships(GetRelationshipsParams {
            entity_id: bob.id,
            tags: Some(vec!["colleague".to_string(), "neighbor".to_string()]),
        })
        .await
        .unwrap();
    assert_eq!(overlapping.len(), 1);
    assert_eq!(overlapping[0].source_entity_id, alice.id);

    let disjoint = adapter
        .get_relationships(GetRelationshipsParams {
            entity_id: alice.id,
            tags: Some(vec!["rival".to_string()]),
        })
        .await
        .unwrap();
    assert!(disjoint.is_empty());

    teardown(&adapter).await;
}

#[tokio::test]
async fn test_over_length_fuzzy_lookup_is_empty() {
    let Some((adapter, _)) = setup().await else {
        return;
    };

    let results = adapter
        .get_cached_embeddings(GetCachedEmbeddingsParams {
            query_table_name: "messages".to_string(),
            query_threshold: 2,
            query_input: "x".repeat(300),
            query_field_name: "content".to_string(),
            query_field_sub_name: "text".to_string(),
            query_match_count: 10,
        })
        .await
        .expect("over-length input is not an error");
    assert!(results.is_empty());

    teardown(&adapter).await;
}

#[tokio::test]
async fn test_core_migration_rerun_is_noop() {
    let Some((adapter, _)) = setup().await else {
        return;
    };

    let reports = adapter
        .run_plugin_migrations(&[core_extension()])
        .await
        .unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].is_noop(), "{:?}", reports[0]);
    assert_eq!(reports[0].existing_tables.len(), core_extension().tables.len());

    teardown(&adapter).await;
}
