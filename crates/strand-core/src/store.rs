//! The store-access interface and supporting types.
//!
//! Backends (e.g. `strand-store-sqlite`) implement [`GraphStore`]. The
//! engine hands them whole read or write units as closures so that every
//! multi-step traversal sees one consistent snapshot and every mutation
//! commits or rolls back as one transaction.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  instance::{Edge, Instance, InstanceId},
  schema::Direction,
  value::Value,
};

// ─── Constraint definitions ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConstraintKind {
  /// Values are unique per entity type; implies an index.
  Unique,
  /// Plain lookup index.
  Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
  pub entity: String,
  pub field:  String,
  pub kind:   ConstraintKind,
}

impl ConstraintSpec {
  /// Stable name used by the store to detect already-applied definitions.
  pub fn name(&self) -> String {
    let prefix = match self.kind {
      ConstraintKind::Unique => "uq",
      ConstraintKind::Index => "ix",
    };
    format!("{prefix}_{}_{}", self.entity, self.field)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintOutcome {
  Created,
  AlreadyExists,
  /// The store is reachable but cannot apply the definition, e.g. existing
  /// data violates a new uniqueness constraint.
  Failed { detail: String },
}

// ─── Transactions ────────────────────────────────────────────────────────────

/// Read access inside one consistent snapshot.
pub trait Snapshot {
  fn get(&self, id: InstanceId) -> Result<Option<Instance>>;

  /// All instances of `entity`, in creation order.
  fn scan(&self, entity: &str) -> Result<Vec<Instance>>;

  /// Ids of the instances of `entity` whose `field` equals `value`, in
  /// creation order. Only valid for fields covered by a provisioned
  /// constraint.
  fn lookup(&self, entity: &str, field: &str, value: &Value) -> Result<Vec<InstanceId>>;

  /// Ids at the other end of `id`'s `label` edges in `direction`, limited to
  /// instances of `other_entity`, in edge creation order.
  fn neighbors(
    &self,
    id: InstanceId,
    label: &str,
    direction: Direction,
    other_entity: &str,
  ) -> Result<Vec<InstanceId>>;
}

/// Write access inside one transaction. Returning an error from the write
/// unit rolls everything back.
pub trait WriteTxn: Snapshot {
  /// Fails with a constraint violation if an indexed unique value is taken.
  fn insert(&mut self, instance: &Instance) -> Result<()>;

  fn update(&mut self, instance: &Instance) -> Result<()>;

  /// Removes the instance and every edge touching it, returning how many
  /// edges went with it.
  fn remove(&mut self, id: InstanceId) -> Result<usize>;

  /// Returns `false` if the edge already existed.
  fn link(&mut self, edge: &Edge) -> Result<bool>;

  /// Returns `false` if there was no such edge.
  fn unlink(&mut self, edge: &Edge) -> Result<bool>;
}

pub type ReadFn<T> = Box<dyn FnOnce(&dyn Snapshot) -> Result<T> + Send>;
pub type WriteFn<T> = Box<dyn FnOnce(&mut dyn WriteTxn) -> Result<T> + Send>;

// ─── Store ───────────────────────────────────────────────────────────────────

/// Abstraction over a graph store backend.
///
/// Implementations map their own failures into
/// [`Error::Store`](crate::Error::Store), except unique-index conflicts,
/// which surface as constraint violations.
pub trait GraphStore: Send + Sync {
  fn define_constraint(
    &self,
    spec: ConstraintSpec,
  ) -> impl Future<Output = Result<ConstraintOutcome>> + Send + '_;

  /// Run `read` against a consistent snapshot.
  fn execute_read<T: Send + 'static>(
    &self,
    read: ReadFn<T>,
  ) -> impl Future<Output = Result<T>> + Send + '_;

  /// Run `write` in a single transaction; commit on `Ok`, roll back on
  /// `Err`.
  fn execute_write<T: Send + 'static>(
    &self,
    write: WriteFn<T>,
  ) -> impl Future<Output = Result<T>> + Send + '_;

  /// Release the store handle.
  fn close(self) -> impl Future<Output = Result<()>> + Send
  where
    Self: Sized;
}
