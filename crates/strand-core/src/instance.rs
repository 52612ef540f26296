//! Instances and edges: the adjacency model the engine reads and writes.
//!
//! Instances are addressed by stable [`InstanceId`]s. Edges refer to both
//! endpoints by id, so self-referential and cyclic structures never need
//! in-memory back-pointers.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

/// Stable identifier of an instance in the store.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for InstanceId {
  fn default() -> Self { Self::new() }
}

impl fmt::Display for InstanceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0.hyphenated(), f)
  }
}

impl FromStr for InstanceId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

/// A runtime record of an entity type.
///
/// `values` holds scalar fields only; relationships live in the edge table.
/// Absent keys read as [`Value::Null`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
  pub id:     InstanceId,
  pub entity: String,
  pub values: BTreeMap<String, Value>,
}

impl Instance {
  pub fn new(id: InstanceId, entity: impl Into<String>) -> Self {
    Self { id, entity: entity.into(), values: BTreeMap::new() }
  }

  pub fn get(&self, field: &str) -> &Value {
    static NULL: Value = Value::Null;
    self.values.get(field).unwrap_or(&NULL)
  }
}

/// A directed, labelled edge between two instances.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
  pub label:         String,
  pub source:        InstanceId,
  pub source_entity: String,
  pub target:        InstanceId,
  pub target_entity: String,
}
