//! Error type for `strand-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A rule violation detected by the store, passed through unchanged.
  #[error("core error: {0}")]
  Core(#[from] strand_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for strand_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      other => strand_core::Error::store(other),
    }
  }
}
