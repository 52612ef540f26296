//! [`Snapshot`] and [`WriteTxn`] over an open SQLite transaction.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension as _, params};
use strand_core::{
  Edge, Instance, InstanceId, Value,
  error::ViolationKind,
  schema::Direction,
  store::{Snapshot, WriteTxn},
};

use crate::{
  Error, Result,
  encode::{RawInstance, decode_id, encode_dt, encode_fields, encode_id},
  schema::literal,
};

/// Borrowed view of a connection inside a transaction the caller owns.
pub struct SqlTxn<'c> {
  conn: &'c Connection,
}

impl<'c> SqlTxn<'c> {
  pub fn new(conn: &'c Connection) -> Self { Self { conn } }

  fn get_row(&self, id: InstanceId) -> Result<Option<Instance>> {
    let sql = format!("SELECT {} FROM instances WHERE instance_id = ?1", RawInstance::COLUMNS);
    let raw = self
      .conn
      .prepare_cached(&sql)?
      .query_row(params![encode_id(id)], RawInstance::from_row)
      .optional()?;
    raw.map(RawInstance::into_instance).transpose()
  }

  fn scan_rows(&self, entity: &str) -> Result<Vec<Instance>> {
    let mut stmt = self.conn.prepare_cached(&format!(
      "SELECT {} FROM instances WHERE entity = ?1 ORDER BY rowid",
      RawInstance::COLUMNS
    ))?;
    let raws = stmt
      .query_map(params![entity], RawInstance::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawInstance::into_instance).collect()
  }

  fn lookup_ids(&self, entity: &str, field: &str, value: &Value) -> Result<Vec<InstanceId>> {
    let Some(key) = value.index_key() else { return Ok(Vec::new()) };
    // Literal entity and field let the planner match the partial index.
    let sql = format!(
      "SELECT f.instance_id FROM field_index f
         JOIN instances i ON i.instance_id = f.instance_id
        WHERE f.entity = {} AND f.field = {} AND f.value = ?1
        ORDER BY i.rowid",
      literal(entity),
      literal(field),
    );
    self.ids(&sql, params![key])
  }

  fn neighbor_ids(
    &self,
    id: InstanceId,
    label: &str,
    direction: Direction,
    other_entity: &str,
  ) -> Result<Vec<InstanceId>> {
    let sql = match direction {
      Direction::Out => {
        "SELECT target_id FROM edges
          WHERE label = ?1 AND source_id = ?2 AND target_entity = ?3 ORDER BY rowid"
      }
      Direction::In => {
        "SELECT source_id FROM edges
          WHERE label = ?1 AND target_id = ?2 AND source_entity = ?3 ORDER BY rowid"
      }
    };
    self.ids(sql, params![label, encode_id(id), other_entity])
  }

  fn ids(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<InstanceId>> {
    let mut stmt = self.conn.prepare_cached(sql)?;
    let raw = stmt
      .query_map(params, |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.iter().map(|s| decode_id(s)).collect()
  }

  /// Fields of `entity` covered by a provisioned constraint.
  fn indexed_fields(&self, entity: &str) -> Result<Vec<String>> {
    let mut stmt = self.conn.prepare_cached("SELECT field FROM constraints WHERE entity = ?1")?;
    let fields = stmt
      .query_map(params![entity], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(fields)
  }

  fn write_index(&self, instance: &Instance) -> Result<()> {
    let id = encode_id(instance.id);
    for field in self.indexed_fields(&instance.entity)? {
      let Some(key) = instance.get(&field).index_key() else { continue };
      let inserted = self
        .conn
        .prepare_cached(
          "INSERT INTO field_index (entity, field, value, instance_id)
           VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![instance.entity, field, key, id]);

      match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, _))
          if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
          return Err(Error::Core(strand_core::Error::violation(
            ViolationKind::Unique,
            &instance.entity,
            Some(&field),
            format!("{key} is already taken"),
          )));
        }
        Err(e) => return Err(e.into()),
      }
    }
    Ok(())
  }

  fn clear_index(&self, id: &str) -> Result<()> {
    self
      .conn
      .prepare_cached("DELETE FROM field_index WHERE instance_id = ?1")?
      .execute(params![id])?;
    Ok(())
  }

  fn insert_row(&self, instance: &Instance) -> Result<()> {
    self
      .conn
      .prepare_cached(
        "INSERT INTO instances (instance_id, entity, fields_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
      )?
      .execute(params![
        encode_id(instance.id),
        instance.entity,
        encode_fields(&instance.values)?,
        encode_dt(Utc::now()),
      ])?;
    self.write_index(instance)
  }

  fn update_row(&self, instance: &Instance) -> Result<()> {
    let id = encode_id(instance.id);
    self
      .conn
      .prepare_cached("UPDATE instances SET fields_json = ?2 WHERE instance_id = ?1")?
      .execute(params![id, encode_fields(&instance.values)?])?;
    self.clear_index(&id)?;
    self.write_index(instance)
  }

  fn remove_row(&self, id: InstanceId) -> Result<usize> {
    let id = encode_id(id);
    let edges = self
      .conn
      .prepare_cached("DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1")?
      .execute(params![id])?;
    self.clear_index(&id)?;
    self
      .conn
      .prepare_cached("DELETE FROM instances WHERE instance_id = ?1")?
      .execute(params![id])?;
    Ok(edges)
  }

  fn link_edge(&self, edge: &Edge) -> Result<bool> {
    let n = self
      .conn
      .prepare_cached(
        "INSERT OR IGNORE INTO edges (label, source_id, source_entity, target_id, target_entity)
         VALUES (?1, ?2, ?3, ?4, ?5)",
      )?
      .execute(params![
        edge.label,
        encode_id(edge.source),
        edge.source_entity,
        encode_id(edge.target),
        edge.target_entity,
      ])?;
    Ok(n == 1)
  }

  fn unlink_edge(&self, edge: &Edge) -> Result<bool> {
    let n = self
      .conn
      .prepare_cached("DELETE FROM edges WHERE label = ?1 AND source_id = ?2 AND target_id = ?3")?
      .execute(params![edge.label, encode_id(edge.source), encode_id(edge.target)])?;
    Ok(n == 1)
  }
}

// ─── Trait impls ─────────────────────────────────────────────────────────────

impl Snapshot for SqlTxn<'_> {
  fn get(&self, id: InstanceId) -> strand_core::Result<Option<Instance>> { Ok(self.get_row(id)?) }

  fn scan(&self, entity: &str) -> strand_core::Result<Vec<Instance>> { Ok(self.scan_rows(entity)?) }

  fn lookup(
    &self,
    entity: &str,
    field: &str,
    value: &Value,
  ) -> strand_core::Result<Vec<InstanceId>> {
    Ok(self.lookup_ids(entity, field, value)?)
  }

  fn neighbors(
    &self,
    id: InstanceId,
    label: &str,
    direction: Direction,
    other_entity: &str,
  ) -> strand_core::Result<Vec<InstanceId>> {
    Ok(self.neighbor_ids(id, label, direction, other_entity)?)
  }
}

impl WriteTxn for SqlTxn<'_> {
  fn insert(&mut self, instance: &Instance) -> strand_core::Result<()> {
    Ok(self.insert_row(instance)?)
  }

  fn update(&mut self, instance: &Instance) -> strand_core::Result<()> {
    Ok(self.update_row(instance)?)
  }

  fn remove(&mut self, id: InstanceId) -> strand_core::Result<usize> { Ok(self.remove_row(id)?) }

  fn link(&mut self, edge: &Edge) -> strand_core::Result<bool> { Ok(self.link_edge(edge)?) }

  fn unlink(&mut self, edge: &Edge) -> strand_core::Result<bool> { Ok(self.unlink_edge(edge)?) }
}
