//! Scalar values carried by instance fields, filters and query results.

use std::cmp::Ordering;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::ScalarKind;

/// A scalar field value.
///
/// Deserialisation is untagged, so JSON strings always arrive as
/// [`Value::Text`]; they are coerced to ids or timestamps against the schema
/// during validation (see [`Value::coerce`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
  Null,
  Boolean(bool),
  Text(String),
  Id(String),
  Timestamp(DateTime<Utc>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn kind(&self) -> Option<ScalarKind> {
    match self {
      Self::Null => None,
      Self::Boolean(_) => Some(ScalarKind::Boolean),
      Self::Text(_) => Some(ScalarKind::Text),
      Self::Id(_) => Some(ScalarKind::Id),
      Self::Timestamp(_) => Some(ScalarKind::Timestamp),
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::Text(s) | Self::Id(s) => Some(s),
      _ => None,
    }
  }

  /// Convert `self` into a value of `kind`, or `None` if no sensible
  /// conversion exists. `Null` is accepted for every kind; nullability is
  /// the caller's concern.
  pub fn coerce(self, kind: ScalarKind) -> Option<Value> {
    match (self, kind) {
      (Self::Null, _) => Some(Self::Null),
      (Self::Boolean(b), ScalarKind::Boolean) => Some(Self::Boolean(b)),
      (Self::Text(s) | Self::Id(s), ScalarKind::Text) => Some(Self::Text(s)),
      (Self::Text(s) | Self::Id(s), ScalarKind::Id) => Some(Self::Id(s)),
      (Self::Text(s), ScalarKind::Timestamp) => DateTime::parse_from_rfc3339(&s)
        .ok()
        .map(|dt| Self::Timestamp(dt.with_timezone(&Utc))),
      (Self::Timestamp(t), ScalarKind::Timestamp) => Some(Self::Timestamp(t)),
      _ => None,
    }
  }

  /// Total order used for sorting: nulls first, then by kind, then by
  /// the inner value.
  pub fn compare(&self, other: &Value) -> Ordering {
    match (self, other) {
      (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
      (Self::Text(a), Self::Text(b)) | (Self::Id(a), Self::Id(b)) => a.cmp(b),
      (Self::Timestamp(a), Self::Timestamp(b)) => a.cmp(b),
      _ => self.rank().cmp(&other.rank()),
    }
  }

  fn rank(&self) -> u8 {
    match self {
      Self::Null => 0,
      Self::Boolean(_) => 1,
      Self::Text(_) => 2,
      Self::Id(_) => 3,
      Self::Timestamp(_) => 4,
    }
  }

  /// Canonical string form stored in indexes. `Null` is never indexed.
  pub fn index_key(&self) -> Option<String> {
    match self {
      Self::Null => None,
      Self::Boolean(b) => Some(b.to_string()),
      Self::Text(s) | Self::Id(s) => Some(s.clone()),
      Self::Timestamp(t) => Some(t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self { Self::Text(s.to_owned()) }
}

impl From<String> for Value {
  fn from(s: String) -> Self { Self::Text(s) }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self { Self::Boolean(b) }
}

impl From<DateTime<Utc>> for Value {
  fn from(t: DateTime<Utc>) -> Self { Self::Timestamp(t) }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn text_coerces_to_timestamp() {
    let v = Value::from("2024-03-01T12:00:00Z").coerce(ScalarKind::Timestamp);
    let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    assert_eq!(v, Some(Value::Timestamp(expected)));
  }

  #[test]
  fn bad_coercions_are_rejected() {
    assert_eq!(Value::from("nope").coerce(ScalarKind::Timestamp), None);
    assert_eq!(Value::from(true).coerce(ScalarKind::Text), None);
    assert_eq!(Value::from("x").coerce(ScalarKind::Boolean), None);
  }

  #[test]
  fn null_sorts_first() {
    assert_eq!(Value::Null.compare(&Value::from("a")), Ordering::Less);
    assert_eq!(Value::from("b").compare(&Value::from("a")), Ordering::Greater);
  }

  #[test]
  fn json_strings_deserialise_as_text() {
    let v: Value = serde_json::from_str("\"2024-03-01T12:00:00Z\"").unwrap();
    assert_eq!(v, Value::Text("2024-03-01T12:00:00Z".into()));
    let v: Value = serde_json::from_str("null").unwrap();
    assert!(v.is_null());
  }
}
