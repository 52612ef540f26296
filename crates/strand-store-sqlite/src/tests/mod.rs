//! Integration tests for `SqliteStore` and the engine against an in-memory
//! database.

mod concurrency;
mod provision;
mod query;

use strand_core::{
  Engine, EngineConfig, Instance, Schema,
  operation::{CreateInput, Mutation, Query},
  record::QueryResult,
};

use crate::SqliteStore;

pub(super) const CONTENT: &str = include_str!("../../../../schema/content.toml");

pub(super) fn content_schema() -> Schema {
  Schema::from_toml_str(CONTENT).expect("content schema")
}

pub(super) async fn store() -> SqliteStore {
  SqliteStore::open_in_memory().await.expect("in-memory store")
}

pub(super) async fn engine_with(schema: Schema) -> Engine<SqliteStore> {
  Engine::start(schema, store().await, EngineConfig::default())
    .await
    .expect("engine start")
}

pub(super) async fn engine() -> Engine<SqliteStore> { engine_with(content_schema()).await }

pub(super) async fn create(
  engine: &Engine<SqliteStore>,
  entity: &str,
  input: CreateInput,
) -> Instance {
  let mut result = engine.mutate(&Mutation::create(entity, input)).await.unwrap();
  assert_eq!(result.count, 1);
  result.instances.remove(0)
}

pub(super) async fn query(engine: &Engine<SqliteStore>, query: Query) -> QueryResult {
  engine.query(&query).await.unwrap()
}

/// Number of instances of `entity`, read straight from the store.
pub(super) async fn count(engine: &Engine<SqliteStore>, entity: &str) -> usize {
  engine.query(&Query::new(entity)).await.unwrap().total_count
}
