//! Encoding and decoding helpers between core types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings with full sub-second precision. Field
//! values are stored as a JSON object whose entries are tagged by kind, so
//! ids and timestamps survive the round trip distinct from plain text.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use strand_core::{Instance, InstanceId, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Ids ─────────────────────────────────────────────────────────────────────

pub fn encode_id(id: InstanceId) -> String { id.0.hyphenated().to_string() }

pub fn decode_id(s: &str) -> Result<InstanceId> { Ok(InstanceId(Uuid::parse_str(s)?)) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Field values ────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
enum Stored {
  Boolean(bool),
  Text(String),
  Id(String),
  Timestamp(String),
}

pub fn encode_fields(values: &BTreeMap<String, Value>) -> Result<String> {
  let stored: BTreeMap<&str, Stored> = values
    .iter()
    .filter_map(|(k, v)| {
      let s = match v {
        Value::Null => return None,
        Value::Boolean(b) => Stored::Boolean(*b),
        Value::Text(s) => Stored::Text(s.clone()),
        Value::Id(s) => Stored::Id(s.clone()),
        Value::Timestamp(t) => Stored::Timestamp(encode_dt(*t)),
      };
      Some((k.as_str(), s))
    })
    .collect();
  Ok(serde_json::to_string(&stored)?)
}

pub fn decode_fields(s: &str) -> Result<BTreeMap<String, Value>> {
  let stored: BTreeMap<String, Stored> = serde_json::from_str(s)?;
  stored
    .into_iter()
    .map(|(k, v)| {
      let v = match v {
        Stored::Boolean(b) => Value::Boolean(b),
        Stored::Text(s) => Value::Text(s),
        Stored::Id(s) => Value::Id(s),
        Stored::Timestamp(t) => Value::Timestamp(decode_dt(&t)?),
      };
      Ok((k, v))
    })
    .collect()
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `instances` row.
pub struct RawInstance {
  pub instance_id: String,
  pub entity:      String,
  pub fields_json: String,
}

impl RawInstance {
  pub const COLUMNS: &'static str = "instance_id, entity, fields_json";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { instance_id: row.get(0)?, entity: row.get(1)?, fields_json: row.get(2)? })
  }

  pub fn into_instance(self) -> Result<Instance> {
    Ok(Instance {
      id:     decode_id(&self.instance_id)?,
      entity: self.entity,
      values: decode_fields(&self.fields_json)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn fields_keep_their_kinds() {
    let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + chrono::Duration::microseconds(12);
    let values = BTreeMap::from([
      ("title".to_owned(), Value::from("Launch")),
      ("id".to_owned(), Value::Id("abc".into())),
      ("deleted".to_owned(), Value::from(false)),
      ("createdAt".to_owned(), Value::Timestamp(at)),
      ("description".to_owned(), Value::Null),
    ]);

    let decoded = decode_fields(&encode_fields(&values).unwrap()).unwrap();
    assert_eq!(decoded.len(), 4);
    assert_eq!(decoded["id"], Value::Id("abc".into()));
    assert_eq!(decoded["createdAt"], Value::Timestamp(at));
    assert!(!decoded.contains_key("description"));
  }
}
