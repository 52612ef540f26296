use strand_core::{
  Engine, EngineConfig, Error, ErrorKind, Instance, InstanceId, Schema, Value,
  error::ViolationKind,
  operation::{CreateInput, Filter, Mutation, Query, Selection},
  provision::provision,
  store::{GraphStore as _, WriteTxn},
};

use super::{count, create, engine, engine_with, store};

const LOOSE_TAGS: &str = r#"
[[entity]]
name = "Tag"

[[entity.field]]
name     = "text"
kind     = "text"
nullable = false
"#;

const UNIQUE_TAGS: &str = r#"
[[entity]]
name = "Tag"

[[entity.field]]
name      = "text"
kind      = "text"
nullable  = false
modifiers = ["unique"]
"#;

fn schema(source: &str) -> Schema { Schema::from_toml_str(source).unwrap() }

#[tokio::test]
async fn startup_provisions_every_derived_constraint() {
  let engine = engine().await;
  let names = engine.store().constraint_names().await.unwrap();
  assert_eq!(names, [
    "ix_Post_id",
    "uq_User_username",
    "ix_CommentSection_id",
    "ix_Comment_id",
    "uq_Tag_text",
  ]);
}

#[tokio::test]
async fn provisioning_twice_is_a_no_op() {
  let engine = engine().await;
  let report = provision(engine.store(), engine.schema()).await.unwrap();
  assert!(report.created.is_empty());
  assert_eq!(report.existing.len(), 5);
  assert_eq!(engine.store().constraint_names().await.unwrap().len(), 5);
}

#[tokio::test]
async fn schema_without_constraints_provisions_nothing() {
  let s = store().await;
  let report = provision(&s, &schema(LOOSE_TAGS)).await.unwrap();
  assert!(report.created.is_empty() && report.existing.is_empty());
}

#[tokio::test]
async fn conflicting_data_is_fatal_to_startup() {
  let loose = engine_with(schema(LOOSE_TAGS)).await;
  create(&loose, "Tag", CreateInput::new().set("text", "news")).await;
  create(&loose, "Tag", CreateInput::new().set("text", "news")).await;

  let err = Engine::start(schema(UNIQUE_TAGS), loose.store().clone(), EngineConfig::default())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Provisioning);
  assert!(err.to_string().contains("uq_Tag_text"));

  // Nothing was recorded and the data is intact.
  assert!(loose.store().constraint_names().await.unwrap().is_empty());
  assert_eq!(count(&loose, "Tag").await, 2);
}

#[tokio::test]
async fn new_constraint_covers_existing_rows() {
  let loose = engine_with(schema(LOOSE_TAGS)).await;
  create(&loose, "Tag", CreateInput::new().set("text", "rust")).await;
  create(&loose, "Tag", CreateInput::new().set("text", "sqlite")).await;

  let strict = Engine::start(schema(UNIQUE_TAGS), loose.store().clone(), EngineConfig::default())
    .await
    .unwrap();

  // Equality on a unique field goes through the backfilled index.
  let found = strict
    .query(&Query::new("Tag").filter(Filter::eq("text", "sqlite")).select(Selection::fields(["text"])))
    .await
    .unwrap();
  assert_eq!(found.to_json(), serde_json::json!([{ "text": "sqlite" }]));

  let err = strict
    .mutate(&Mutation::create("Tag", CreateInput::new().set("text", "rust")))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
}

#[tokio::test]
async fn unique_index_rejects_duplicate_writes() {
  let engine = engine().await;
  let tag = |text: &str| {
    let mut instance = Instance::new(InstanceId::new(), "Tag");
    instance.values.insert("text".into(), Value::from(text));
    instance
  };
  let (first, second) = (tag("news"), tag("news"));

  // Straight to the store, past the engine's own pre-check.
  let err = engine
    .store()
    .execute_write(Box::new(move |txn: &mut dyn WriteTxn| {
      txn.insert(&first)?;
      txn.insert(&second)
    }))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::ConstraintViolation { kind: ViolationKind::Unique, .. }));
  assert_eq!(err.location(), (Some("Tag"), Some("text")));

  assert_eq!(count(&engine, "Tag").await, 0);
}
