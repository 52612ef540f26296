//! Error types for `strand-core`.
//!
//! Startup-class failures ([`Error::Schema`], [`Error::Provisioning`]) abort
//! the process. Everything else is raised per operation, after the store
//! transaction has been rolled back.

use std::fmt;

use thiserror::Error;

use crate::schema::SchemaError;

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Coarse classification of an [`Error`], stable across variants' details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  Schema,
  Provisioning,
  Validation,
  ConstraintViolation,
  Store,
}

/// What rule a rejected write broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ViolationKind {
  /// A `unique` field value already belongs to another instance.
  Unique,
  /// A single-cardinality relationship would hold more than one edge.
  Cardinality,
  /// A connect target matched no instance.
  DanglingReference,
}

/// Human-readable detail plus the offending entity type and field, when
/// known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detail {
  pub message: String,
  pub entity:  Option<String>,
  pub field:   Option<String>,
}

impl fmt::Display for Detail {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (&self.entity, &self.field) {
      (Some(e), Some(fl)) => write!(f, "{e}.{fl}: {}", self.message),
      (Some(e), None) => write!(f, "{e}: {}", self.message),
      _ => f.write_str(&self.message),
    }
  }
}

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum Error {
  #[error("schema error: {0}")]
  Schema(#[from] SchemaError),

  #[error("provisioning failed for constraint {constraint}: {detail}")]
  Provisioning { constraint: String, detail: String },

  #[error("validation error: {0}")]
  Validation(Detail),

  #[error("constraint violation ({kind}): {detail}")]
  ConstraintViolation { kind: ViolationKind, detail: Detail },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Schema(_) => ErrorKind::Schema,
      Self::Provisioning { .. } => ErrorKind::Provisioning,
      Self::Validation(_) => ErrorKind::Validation,
      Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
      Self::Store(_) => ErrorKind::Store,
    }
  }

  /// Only opaque store failures are worth retrying; everything else will
  /// fail the same way again.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Store(_)) }

  pub fn validation(message: impl Into<String>) -> Self {
    Self::Validation(Detail { message: message.into(), entity: None, field: None })
  }

  pub fn invalid_field(
    entity: impl Into<String>,
    field: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self::Validation(Detail {
      message: message.into(),
      entity:  Some(entity.into()),
      field:   Some(field.into()),
    })
  }

  pub fn violation(
    kind: ViolationKind,
    entity: impl Into<String>,
    field: Option<&str>,
    message: impl Into<String>,
  ) -> Self {
    Self::ConstraintViolation {
      kind,
      detail: Detail {
        message: message.into(),
        entity:  Some(entity.into()),
        field:   field.map(str::to_owned),
      },
    }
  }

  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  /// The entity type and field the error refers to, if any.
  pub fn location(&self) -> (Option<&str>, Option<&str>) {
    match self {
      Self::Validation(d) | Self::ConstraintViolation { detail: d, .. } => {
        (d.entity.as_deref(), d.field.as_deref())
      }
      _ => (None, None),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
