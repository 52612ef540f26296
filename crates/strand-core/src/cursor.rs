//! Opaque pagination cursors.
//!
//! A cursor names the position of a record within the filtered, sorted
//! result list. It is only meaningful for the same query shape.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as B64};

use crate::{Error, Result};

const PREFIX: &str = "position:";

pub fn encode(position: usize) -> String { B64.encode(format!("{PREFIX}{position}")) }

pub fn decode(cursor: &str) -> Result<usize> {
  let malformed = || Error::validation(format!("malformed cursor {cursor:?}"));
  let bytes = B64.decode(cursor).map_err(|_| malformed())?;
  let text = String::from_utf8(bytes).map_err(|_| malformed())?;
  text
    .strip_prefix(PREFIX)
    .and_then(|n| n.parse().ok())
    .ok_or_else(malformed)
}
