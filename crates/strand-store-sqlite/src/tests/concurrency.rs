use std::time::Duration;

use strand_core::{
  Engine, EngineConfig, Error,
  error::ViolationKind,
  operation::{CreateInput, Filter, Mutation, Query, Selection},
  store::{GraphStore as _, WriteTxn},
};

use super::{content_schema, count, create, engine};
use crate::SqliteStore;

#[tokio::test]
async fn racing_creates_of_one_username_admit_exactly_one() {
  let engine = engine().await;
  let signup = Mutation::create("User", CreateInput::new().set("username", "alice"));

  let (a, b) = tokio::join!(engine.mutate(&signup), engine.mutate(&signup));
  let (ok, err): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(Result::is_ok);
  assert_eq!(ok.len(), 1);
  assert_eq!(err.len(), 1);
  assert!(matches!(
    err.into_iter().next().and_then(Result::err),
    Some(Error::ConstraintViolation { kind: ViolationKind::Unique, .. })
  ));
  assert_eq!(count(&engine, "User").await, 1);
}

#[tokio::test]
async fn spawned_writers_keep_every_write() {
  let engine = engine().await;

  let handles: Vec<_> = (0..8)
    .map(|n| {
      let engine = engine.clone();
      tokio::spawn(async move {
        engine
          .mutate(&Mutation::create("Tag", CreateInput::new().set("text", format!("tag-{n}"))))
          .await
      })
    })
    .collect();
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  assert_eq!(count(&engine, "Tag").await, 8);
}

#[tokio::test]
async fn reads_run_alongside_writes() {
  let engine = engine().await;
  create(&engine, "User", CreateInput::new().set("username", "alice")).await;

  let read = Query::new("User")
    .filter(Filter::eq("username", "alice"))
    .select(Selection::fields(["username"]));
  let write = Mutation::create("User", CreateInput::new().set("username", "bob"));

  let (first, written, second) =
    tokio::join!(engine.query(&read), engine.mutate(&write), engine.query(&read));
  assert_eq!(first.unwrap().total_count, 1);
  assert_eq!(written.unwrap().count, 1);
  assert_eq!(second.unwrap().total_count, 1);
  assert_eq!(count(&engine, "User").await, 2);
}

#[tokio::test]
async fn file_store_reads_do_not_wait_for_writes() {
  let path = std::env::temp_dir().join(format!("strand-{}.db", uuid::Uuid::new_v4()));
  let store = SqliteStore::open(&path).await.unwrap();
  let engine = Engine::start(content_schema(), store, EngineConfig::default()).await.unwrap();
  create(&engine, "Tag", CreateInput::new().set("text", "news")).await;

  // Hold the write connection inside an open transaction.
  let writer = engine.clone();
  let slow = tokio::spawn(async move {
    writer
      .store()
      .execute_write(Box::new(|_: &mut dyn WriteTxn| {
        std::thread::sleep(Duration::from_millis(500));
        Ok(())
      }))
      .await
  });
  tokio::time::sleep(Duration::from_millis(50)).await;

  let read = tokio::time::timeout(Duration::from_millis(300), engine.query(&Query::new("Tag")))
    .await
    .expect("read queued behind the write")
    .unwrap();
  assert_eq!(read.total_count, 1);

  slow.await.unwrap().unwrap();
  // Committed writes are visible to the read connection.
  create(&engine, "Tag", CreateInput::new().set("text", "misc")).await;
  assert_eq!(count(&engine, "Tag").await, 2);

  engine.shutdown().await.unwrap();
  for suffix in ["", "-wal", "-shm"] {
    let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
  }
}
