//! Engine tuning knobs, deserialisable from the service configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Deepest relationship nesting a query may request. Self-referential
  /// relationships are otherwise unbounded.
  pub max_depth:     usize,
  /// Limit applied to root and nested lists when the query gives none.
  pub default_limit: Option<usize>,
  /// Upper bound on any requested limit.
  pub max_limit:     Option<usize>,
  /// Allow the `matches` (regular expression) filter operator.
  pub enable_regex:  bool,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self { max_depth: 16, default_limit: None, max_limit: None, enable_regex: true }
  }
}
