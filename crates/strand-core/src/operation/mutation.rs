use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Filter;
use crate::{instance::InstanceId, value::Value};

/// A write against the graph. Each mutation is applied atomically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
  Create {
    entity: String,
    input:  CreateInput,
  },
  /// Applies `input` to every instance matching `filter`.
  Update {
    entity: String,
    filter: Option<Filter>,
    input:  UpdateInput,
  },
  Delete {
    entity: String,
    filter: Option<Filter>,
  },
  Connect {
    entity: String,
    filter: Option<Filter>,
    field:  String,
    target: Filter,
    #[serde(default)]
    mode:   ConnectMode,
  },
  /// With no `target`, every edge of `field` is removed.
  Disconnect {
    entity: String,
    filter: Option<Filter>,
    field:  String,
    #[serde(default)]
    target: Option<Filter>,
  },
}

impl Mutation {
  pub fn entity(&self) -> &str {
    match self {
      Self::Create { entity, .. }
      | Self::Update { entity, .. }
      | Self::Delete { entity, .. }
      | Self::Connect { entity, .. }
      | Self::Disconnect { entity, .. } => entity,
    }
  }

  pub fn create(entity: impl Into<String>, input: CreateInput) -> Self {
    Self::Create { entity: entity.into(), input }
  }

  pub fn update(entity: impl Into<String>, filter: Filter, input: UpdateInput) -> Self {
    Self::Update { entity: entity.into(), filter: Some(filter), input }
  }

  pub fn delete(entity: impl Into<String>, filter: Filter) -> Self {
    Self::Delete { entity: entity.into(), filter: Some(filter) }
  }
}

/// How a connect treats an existing edge on a single-cardinality side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
  /// Disconnect the existing edge in the same transaction.
  #[default]
  Replace,
  /// Fail with a cardinality violation instead.
  IfAbsent,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateInput {
  /// Explicit instance identifier; generated when absent.
  #[serde(default)]
  pub id:        Option<InstanceId>,
  #[serde(default)]
  pub values:    BTreeMap<String, Value>,
  #[serde(default)]
  pub relations: BTreeMap<String, Vec<RelationOp>>,
}

impl CreateInput {
  pub fn new() -> Self { Self::default() }

  pub fn with_id(mut self, id: InstanceId) -> Self {
    self.id = Some(id);
    self
  }

  pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(field.into(), value.into());
    self
  }

  pub fn relate(mut self, field: impl Into<String>, op: RelationOp) -> Self {
    self.relations.entry(field.into()).or_default().push(op);
    self
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateInput {
  #[serde(default)]
  pub values:    BTreeMap<String, Value>,
  #[serde(default)]
  pub relations: BTreeMap<String, Vec<RelationOp>>,
}

impl UpdateInput {
  pub fn new() -> Self { Self::default() }

  pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
    self.values.insert(field.into(), value.into());
    self
  }

  pub fn relate(mut self, field: impl Into<String>, op: RelationOp) -> Self {
    self.relations.entry(field.into()).or_default().push(op);
    self
  }
}

/// A nested operation on one relationship field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationOp {
  /// Create an instance of the field's target type and connect it.
  Create(CreateInput),
  Connect {
    target: Filter,
    #[serde(default)]
    mode:   ConnectMode,
  },
  Disconnect {
    #[serde(default)]
    target: Option<Filter>,
  },
}

impl RelationOp {
  pub fn connect(target: Filter) -> Self { Self::Connect { target, mode: ConnectMode::Replace } }

  pub fn connect_if_absent(target: Filter) -> Self {
    Self::Connect { target, mode: ConnectMode::IfAbsent }
  }

  pub fn disconnect(target: Option<Filter>) -> Self { Self::Disconnect { target } }
}
