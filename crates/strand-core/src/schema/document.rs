//! The declarative schema description, as deserialised from TOML.
//!
//! All enumerated values are plain strings here so that compilation can
//! report which entity and field carried a bad value.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaDocument {
  #[serde(default, rename = "entity")]
  pub entities: Vec<EntityDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDocument {
  pub name:   String,
  #[serde(default, rename = "field")]
  pub fields: Vec<FieldDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDocument {
  pub name:         String,
  /// Scalar kind; mutually exclusive with `relationship`.
  #[serde(default)]
  pub kind:         Option<String>,
  #[serde(default)]
  pub relationship: Option<RelationshipDocument>,
  /// `single` | `many`; relationships only, defaults to `single`.
  #[serde(default)]
  pub cardinality:  Option<String>,
  #[serde(default = "default_nullable")]
  pub nullable:     bool,
  #[serde(default)]
  pub modifiers:    Vec<String>,
  /// `detach` | `cascade`; relationships only.
  #[serde(default)]
  pub on_delete:    Option<String>,
}

fn default_nullable() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDocument {
  pub label:     String,
  pub direction: String,
  pub target:    String,
}

impl EntityDocument {
  pub fn new(name: impl Into<String>) -> Self { Self { name: name.into(), fields: Vec::new() } }

  pub fn field(mut self, field: FieldDocument) -> Self {
    self.fields.push(field);
    self
  }
}

impl FieldDocument {
  pub fn scalar(name: impl Into<String>, kind: impl Into<String>) -> Self {
    Self {
      name:         name.into(),
      kind:         Some(kind.into()),
      relationship: None,
      cardinality:  None,
      nullable:     true,
      modifiers:    Vec::new(),
      on_delete:    None,
    }
  }

  pub fn relationship(
    name: impl Into<String>,
    label: impl Into<String>,
    direction: impl Into<String>,
    target: impl Into<String>,
    cardinality: impl Into<String>,
  ) -> Self {
    Self {
      name:         name.into(),
      kind:         None,
      relationship: Some(RelationshipDocument {
        label:     label.into(),
        direction: direction.into(),
        target:    target.into(),
      }),
      cardinality:  Some(cardinality.into()),
      nullable:     true,
      modifiers:    Vec::new(),
      on_delete:    None,
    }
  }

  pub fn required(mut self) -> Self {
    self.nullable = false;
    self
  }

  pub fn modifier(mut self, modifier: impl Into<String>) -> Self {
    self.modifiers.push(modifier.into());
    self
  }

  pub fn on_delete(mut self, policy: impl Into<String>) -> Self {
    self.on_delete = Some(policy.into());
    self
  }
}
