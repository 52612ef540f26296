use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A predicate over an entity type's own fields, optionally reaching
/// through relationships with a quantified existence test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
  And(Vec<Filter>),
  Or(Vec<Filter>),
  Not(Box<Filter>),
  Compare {
    field: String,
    op:    CompareOp,
    value: Value,
  },
  In {
    field:  String,
    values: Vec<Value>,
  },
  IsNull {
    field:   String,
    #[serde(default = "yes")]
    is_null: bool,
  },
  /// Existence predicate on a relationship: restricts which instances of
  /// the declaring type match, based on their related instances.
  Relation {
    field:      String,
    quantifier: Quantifier,
    #[serde(default)]
    filter:     Option<Box<Filter>>,
  },
}

fn yes() -> bool { true }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Lte,
  Gt,
  Gte,
  Contains,
  StartsWith,
  EndsWith,
  /// Regular expression match; requires `EngineConfig::enable_regex`.
  Matches,
}

impl CompareOp {
  pub fn is_ordering(self) -> bool { matches!(self, Self::Lt | Self::Lte | Self::Gt | Self::Gte) }

  pub fn is_textual(self) -> bool {
    matches!(self, Self::Contains | Self::StartsWith | Self::EndsWith | Self::Matches)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantifier {
  /// At least one related instance matches.
  Some,
  /// No related instance matches.
  None,
  /// Every related instance matches (vacuously true when there are none).
  All,
  /// Exactly one related instance matches.
  Single,
}

impl Filter {
  pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
    Self::compare(field, CompareOp::Eq, value)
  }

  pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
    Self::Compare { field: field.into(), op, value: value.into() }
  }

  pub fn is_null(field: impl Into<String>) -> Self {
    Self::IsNull { field: field.into(), is_null: true }
  }

  pub fn relation(field: impl Into<String>, quantifier: Quantifier, filter: Option<Filter>) -> Self {
    Self::Relation { field: field.into(), quantifier, filter: filter.map(Box::new) }
  }

  pub fn and(self, other: Filter) -> Self {
    match self {
      Self::And(mut all) => {
        all.push(other);
        Self::And(all)
      }
      first => Self::And(vec![first, other]),
    }
  }

  #[allow(clippy::should_implement_trait)]
  pub fn not(self) -> Self { Self::Not(Box::new(self)) }
}
