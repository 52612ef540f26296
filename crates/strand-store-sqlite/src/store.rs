//! [`SqliteStore`]: the SQLite implementation of [`GraphStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OpenFlags, OptionalExtension as _, TransactionBehavior, params};
use strand_core::store::{
  ConstraintKind, ConstraintOutcome, ConstraintSpec, GraphStore, ReadFn, WriteFn,
};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{RawInstance, encode_dt, encode_id},
  schema::{SCHEMA, constraint_index},
  txn::SqlTxn,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strand graph store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connections are reference-counted. Writes
/// run on one connection thread, so write units never interleave. A
/// file-backed store reads through a second, read-only connection, which
/// WAL mode lets proceed while a write is in flight.
#[derive(Clone, Debug)]
pub struct SqliteStore {
  writer: tokio_rusqlite::Connection,
  /// `None` for in-memory stores, which cannot be shared between
  /// connections; reads then go through `writer`.
  reader: Option<tokio_rusqlite::Connection>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let writer = tokio_rusqlite::Connection::open(path).await?;
    init_schema(&writer).await?;

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
      | OpenFlags::SQLITE_OPEN_NO_MUTEX
      | OpenFlags::SQLITE_OPEN_URI;
    let reader = tokio_rusqlite::Connection::open_with_flags(path, flags).await?;
    Ok(Self { writer, reader: Some(reader) })
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let writer = tokio_rusqlite::Connection::open_in_memory().await?;
    init_schema(&writer).await?;
    Ok(Self { writer, reader: None })
  }

  fn reader(&self) -> &tokio_rusqlite::Connection { self.reader.as_ref().unwrap_or(&self.writer) }

  /// Names of the constraints recorded so far, in creation order.
  pub async fn constraint_names(&self) -> Result<Vec<String>> {
    let names = self
      .writer
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM constraints ORDER BY rowid")?;
        let names = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
      })
      .await?;
    Ok(names)
  }

  async fn apply_constraint(&self, spec: ConstraintSpec) -> Result<ConstraintOutcome> {
    let name = spec.name();

    let outcome = self
      .writer
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
          .query_row("SELECT 1 FROM constraints WHERE name = ?1", params![name], |_| Ok(()))
          .optional()?
          .is_some();
        if exists {
          return Ok(Ok(ConstraintOutcome::AlreadyExists));
        }

        let backfilled = match backfill(&tx, &spec) {
          Ok(n) => n,
          Err(e) => return Ok(Err(e)),
        };

        let unique = spec.kind == ConstraintKind::Unique;
        let ddl = constraint_index(&name, unique, &spec.entity, &spec.field);
        match tx.execute_batch(&ddl) {
          Ok(()) => {}
          Err(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            // Dropping `tx` rolls the backfill back.
            let detail = msg.unwrap_or_else(|| "existing values are not unique".to_owned());
            return Ok(Ok(ConstraintOutcome::Failed { detail }));
          }
          Err(e) => return Err(e.into()),
        }

        tx.execute(
          "INSERT INTO constraints (name, kind, entity, field, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![name, spec.kind.to_string(), spec.entity, spec.field, encode_dt(Utc::now())],
        )?;
        tx.commit()?;

        info!(constraint = %name, backfilled, "constraint index built");
        Ok(Ok(ConstraintOutcome::Created))
      })
      .await??;

    Ok(outcome)
  }
}

async fn init_schema(conn: &tokio_rusqlite::Connection) -> Result<()> {
  conn
    .call(|conn| {
      conn.execute_batch(SCHEMA)?;
      Ok(())
    })
    .await?;
  Ok(())
}

/// Index the existing instances of `spec.entity` for a new constraint.
fn backfill(conn: &rusqlite::Connection, spec: &ConstraintSpec) -> Result<usize> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM instances WHERE entity = ?1 ORDER BY rowid",
    RawInstance::COLUMNS
  ))?;
  let raws = stmt
    .query_map(params![spec.entity], RawInstance::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut count = 0;
  for raw in raws {
    let instance = raw.into_instance()?;
    let Some(key) = instance.get(&spec.field).index_key() else { continue };
    count += conn.execute(
      "INSERT OR IGNORE INTO field_index (entity, field, value, instance_id)
       VALUES (?1, ?2, ?3, ?4)",
      params![spec.entity, spec.field, key, encode_id(instance.id)],
    )?;
  }
  Ok(count)
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  async fn define_constraint(
    &self,
    spec: ConstraintSpec,
  ) -> strand_core::Result<ConstraintOutcome> {
    debug!(constraint = %spec.name(), "defining constraint");
    Ok(self.apply_constraint(spec).await?)
  }

  async fn execute_read<T: Send + 'static>(&self, read: ReadFn<T>) -> strand_core::Result<T> {
    let result = self
      .reader()
      .call(move |conn| {
        // A deferred transaction pins one snapshot for every statement.
        let tx = conn.transaction()?;
        let result = read(&SqlTxn::new(&tx));
        tx.commit()?;
        Ok(result)
      })
      .await
      .map_err(Error::from)?;
    result
  }

  async fn execute_write<T: Send + 'static>(&self, write: WriteFn<T>) -> strand_core::Result<T> {
    let result = self
      .writer
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = write(&mut SqlTxn::new(&tx));
        match result {
          Ok(_) => tx.commit()?,
          Err(_) => tx.rollback()?,
        }
        Ok(result)
      })
      .await
      .map_err(Error::from)?;
    result
  }

  async fn close(self) -> strand_core::Result<()> {
    if let Some(reader) = self.reader {
      reader.close().await.map_err(Error::from)?;
    }
    self.writer.close().await.map_err(Error::from)?;
    Ok(())
  }
}
