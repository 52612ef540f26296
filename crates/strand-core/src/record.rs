//! Result shapes returned by the resolver and the mutation engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{instance::Instance, value::Value};

/// One resolved instance, holding exactly the requested keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(pub BTreeMap<String, Node>);

impl Record {
  pub fn get(&self, key: &str) -> Option<&Node> { self.0.get(key) }

  pub fn scalar(&self, key: &str) -> Option<&Value> {
    match self.0.get(key) {
      Some(Node::Scalar(v)) => Some(v),
      _ => None,
    }
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.keys().map(String::as_str) }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
  Scalar(Value),
  /// A single-cardinality relationship; `None` when unconnected.
  One(Option<Box<Record>>),
  Many(Vec<Record>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
  pub end_cursor:    Option<String>,
  pub has_next_page: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
  pub records:     Vec<Record>,
  /// Matches before pagination.
  pub total_count: usize,
  pub page_info:   PageInfo,
}

impl QueryResult {
  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Array(self.records.iter().map(Record::to_json).collect())
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationInfo {
  pub nodes_created:         usize,
  pub nodes_updated:         usize,
  pub nodes_deleted:         usize,
  pub relationships_created: usize,
  pub relationships_deleted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
  /// Root instances affected, in their post-mutation state (pre-delete
  /// state for deletes).
  pub instances: Vec<Instance>,
  pub count:     usize,
  pub info:      MutationInfo,
}

/// Result of an [`Operation`](crate::operation::Operation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
  Query(QueryResult),
  Mutation(MutationResult),
}
