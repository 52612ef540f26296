//! The compiled schema model.
//!
//! A [`Schema`] is produced once from a declarative [`SchemaDocument`]
//! (usually TOML) and is immutable afterwards. Every other component reads
//! it; nothing inspects the raw document at request time.

mod compile;
mod document;

use std::{collections::HashMap, path::Path};

use thiserror::Error;

use crate::{
  error::Error,
  instance::{Edge, InstanceId},
};

pub use document::{EntityDocument, FieldDocument, RelationshipDocument, SchemaDocument};

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display, strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ScalarKind {
  Id,
  Text,
  Boolean,
  Timestamp,
}

/// Edge direction relative to the declaring entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
  Out,
  In,
}

impl Direction {
  pub fn reverse(self) -> Self {
    match self {
      Self::Out => Self::In,
      Self::In => Self::Out,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
  Single,
  Many,
}

/// What happens to the related instances when the declaring instance is
/// deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OnDelete {
  /// Only the edges go away.
  #[default]
  Detach,
  /// Related instances reached through this field are deleted as well.
  Cascade,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
  Unique,
  GeneratedIdentifier,
  TimestampOnCreate,
  /// `on_create` is false for the update-only form.
  TimestampOnUpdate { on_create: bool },
}

impl Modifier {
  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "unique" => Some(Self::Unique),
      "generated-identifier" => Some(Self::GeneratedIdentifier),
      "auto-timestamp-on-create" => Some(Self::TimestampOnCreate),
      "auto-timestamp-on-update" => Some(Self::TimestampOnUpdate { on_create: true }),
      "auto-timestamp-on-update-only" => Some(Self::TimestampOnUpdate { on_create: false }),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Unique => "unique",
      Self::GeneratedIdentifier => "generated-identifier",
      Self::TimestampOnCreate => "auto-timestamp-on-create",
      Self::TimestampOnUpdate { on_create: true } => "auto-timestamp-on-update",
      Self::TimestampOnUpdate { on_create: false } => "auto-timestamp-on-update-only",
    }
  }
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// A relationship declaration on one side of an edge definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
  pub label:       String,
  pub direction:   Direction,
  pub cardinality: Cardinality,
  /// Entity type at the other end.
  pub target:      String,
  /// The paired field declared on `target`.
  pub partner:     String,
  pub on_delete:   OnDelete,
}

impl Relationship {
  /// Build the edge connecting `owner` (an instance of `owner_entity`, the
  /// declaring type) to `other` (an instance of [`Self::target`]).
  pub fn edge(&self, owner: InstanceId, owner_entity: &str, other: InstanceId) -> Edge {
    match self.direction {
      Direction::Out => Edge {
        label:         self.label.clone(),
        source:        owner,
        source_entity: owner_entity.to_owned(),
        target:        other,
        target_entity: self.target.clone(),
      },
      Direction::In => Edge {
        label:         self.label.clone(),
        source:        other,
        source_entity: self.target.clone(),
        target:        owner,
        target_entity: owner_entity.to_owned(),
      },
    }
  }

  pub fn is_single(&self) -> bool { self.cardinality == Cardinality::Single }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
  Scalar(ScalarKind),
  Relationship(Relationship),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
  pub name:      String,
  pub kind:      FieldKind,
  pub nullable:  bool,
  pub modifiers: Vec<Modifier>,
}

impl Field {
  pub fn scalar(&self) -> Option<ScalarKind> {
    match &self.kind {
      FieldKind::Scalar(k) => Some(*k),
      FieldKind::Relationship(_) => None,
    }
  }

  pub fn relationship(&self) -> Option<&Relationship> {
    match &self.kind {
      FieldKind::Relationship(r) => Some(r),
      FieldKind::Scalar(_) => None,
    }
  }

  pub fn has(&self, modifier: Modifier) -> bool { self.modifiers.contains(&modifier) }

  pub fn is_unique(&self) -> bool { self.has(Modifier::Unique) }

  pub fn is_generated(&self) -> bool { self.has(Modifier::GeneratedIdentifier) }

  pub fn stamps_on_create(&self) -> bool {
    self.modifiers.iter().any(|m| {
      matches!(m, Modifier::TimestampOnCreate | Modifier::TimestampOnUpdate { on_create: true })
    })
  }

  pub fn stamps_on_update(&self) -> bool {
    self.modifiers.iter().any(|m| matches!(m, Modifier::TimestampOnUpdate { .. }))
  }

  /// Engine-maintained fields never accept caller-supplied values.
  pub fn is_managed(&self) -> bool {
    self.is_generated()
      || self
        .modifiers
        .iter()
        .any(|m| matches!(m, Modifier::TimestampOnCreate | Modifier::TimestampOnUpdate { .. }))
  }

  /// Fields backed by a store-level index.
  pub fn is_indexed(&self) -> bool { self.is_unique() || self.is_generated() }

  /// Whether a create must carry a value (or a connection) for this field.
  pub fn is_required(&self) -> bool {
    if self.nullable {
      return false;
    }
    match &self.kind {
      FieldKind::Scalar(_) => !self.is_generated() && !self.stamps_on_create(),
      FieldKind::Relationship(r) => r.is_single(),
    }
  }
}

// ─── Entity types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EntityType {
  pub name: String,
  fields:   Vec<Field>,
  by_name:  HashMap<String, usize>,
}

impl EntityType {
  fn new(name: String, fields: Vec<Field>) -> Self {
    let by_name = fields.iter().enumerate().map(|(i, f)| (f.name.clone(), i)).collect();
    Self { name, fields, by_name }
  }

  pub fn field(&self, name: &str) -> Option<&Field> {
    self.by_name.get(name).map(|&i| &self.fields[i])
  }

  /// Fields in declaration order.
  pub fn fields(&self) -> impl Iterator<Item = &Field> { self.fields.iter() }

  pub fn relationships(&self) -> impl Iterator<Item = (&Field, &Relationship)> {
    self.fields.iter().filter_map(|f| f.relationship().map(|r| (f, r)))
  }

  pub fn generated_identifier(&self) -> Option<&Field> {
    self.fields.iter().find(|f| f.is_generated())
  }

  pub(crate) fn require_field(&self, name: &str) -> Result<&Field, Error> {
    self
      .field(name)
      .ok_or_else(|| Error::invalid_field(&self.name, name, "unknown field"))
  }

  pub(crate) fn require_relationship(&self, name: &str) -> Result<&Relationship, Error> {
    self
      .require_field(name)?
      .relationship()
      .ok_or_else(|| Error::invalid_field(&self.name, name, "not a relationship field"))
  }
}

/// One bidirectional edge definition: the pair of fields that declare it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeDefinition {
  pub label:     String,
  pub source:    String,
  pub target:    String,
  /// Field on `source` declaring direction `out`.
  pub out_field: String,
  /// Field on `target` declaring direction `in`.
  pub in_field:  String,
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Schema {
  entities: Vec<EntityType>,
  by_name:  HashMap<String, usize>,
  edges:    Vec<EdgeDefinition>,
}

impl Schema {
  /// Parse and compile a TOML schema description.
  pub fn from_toml_str(source: &str) -> Result<Self, SchemaError> {
    let doc: SchemaDocument = toml::from_str(source)?;
    Self::compile(doc)
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
      .map_err(|source| SchemaError::Io { path: path.display().to_string(), source })?;
    Self::from_toml_str(&source)
  }

  /// Validate `doc` and build the immutable model. Nothing is registered
  /// unless the whole document is valid.
  pub fn compile(doc: SchemaDocument) -> Result<Self, SchemaError> {
    let (entities, edges) = compile::compile(doc)?;
    let by_name = entities.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();
    Ok(Self { entities, by_name, edges })
  }

  pub fn entity(&self, name: &str) -> Option<&EntityType> {
    self.by_name.get(name).map(|&i| &self.entities[i])
  }

  pub fn entities(&self) -> impl Iterator<Item = &EntityType> { self.entities.iter() }

  pub fn edges(&self) -> &[EdgeDefinition] { &self.edges }

  pub(crate) fn require_entity(&self, name: &str) -> Result<&EntityType, Error> {
    self.entity(name).ok_or_else(|| {
      Error::Validation(crate::error::Detail {
        message: "unknown entity type".into(),
        entity:  Some(name.to_owned()),
        field:   None,
      })
    })
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SchemaError {
  #[error("failed to parse schema: {0}")]
  Parse(#[from] toml::de::Error),

  #[error("failed to read schema {path}: {source}")]
  Io {
    path:   String,
    #[source]
    source: std::io::Error,
  },

  #[error("schema declares no entity types")]
  Empty,

  #[error("invalid name {0:?}: expected [A-Za-z_][A-Za-z0-9_]*")]
  InvalidName(String),

  #[error("duplicate entity type {0:?}")]
  DuplicateEntity(String),

  #[error("{entity}.{field}: duplicate field name")]
  DuplicateField { entity: String, field: String },

  #[error("{entity}.{field}: {detail}")]
  InvalidField { entity: String, field: String, detail: String },

  #[error("{entity}.{field}: unknown scalar kind {kind:?}")]
  UnknownScalarKind { entity: String, field: String, kind: String },

  #[error("{entity}.{field}: unknown modifier {modifier:?}")]
  UnknownModifier { entity: String, field: String, modifier: String },

  #[error("{entity}.{field}: relationship target {target:?} is not a declared entity type")]
  UnknownTarget { entity: String, field: String, target: String },

  #[error("{entity}.{field}: relationship {label:?} has no paired declaration on {target:?}")]
  UnpairedRelationship { label: String, entity: String, field: String, target: String },

  #[error("{entity}.{field}: relationship {label:?} is already declared by {entity}.{other}{detail}")]
  ConflictingDeclaration {
    label:  String,
    entity: String,
    field:  String,
    other:  String,
    detail: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  const CONTENT: &str = include_str!("../../../../schema/content.toml");

  fn tag_and_post() -> SchemaDocument {
    SchemaDocument {
      entities: vec![
        EntityDocument::new("Post")
          .field(FieldDocument::scalar("title", "text").required())
          .field(FieldDocument::relationship("Tags", "HAS_TAG", "out", "Tag", "many")),
        EntityDocument::new("Tag")
          .field(FieldDocument::scalar("text", "text").required().modifier("unique"))
          .field(FieldDocument::relationship("Posts", "HAS_TAG", "in", "Post", "many")),
      ],
    }
  }

  #[test]
  fn content_schema_compiles() {
    let schema = Schema::from_toml_str(CONTENT).unwrap();
    assert_eq!(schema.entities().count(), 5);
    assert_eq!(schema.edges().len(), 7);

    let comment = schema.entity("Comment").unwrap();
    let parent = comment.field("ParentComment").unwrap().relationship().unwrap();
    assert_eq!(parent.target, "Comment");
    assert_eq!(parent.partner, "ChildComments");
    assert!(parent.is_single());

    let tag = schema.entity("Tag").unwrap();
    assert_eq!(tag.field("Comments").unwrap().relationship().unwrap().partner, "Tags");
    assert!(tag.field("text").unwrap().is_unique());
  }

  #[test]
  fn field_order_is_preserved() {
    let schema = Schema::from_toml_str(CONTENT).unwrap();
    let names: Vec<_> = schema.entity("User").unwrap().fields().map(|f| f.name.as_str()).collect();
    assert_eq!(names, ["username", "Comments", "Posts", "createdAt", "deleted"]);
  }

  #[test]
  fn required_fields_exclude_managed_ones() {
    let schema = Schema::from_toml_str(CONTENT).unwrap();
    let post = schema.entity("Post").unwrap();
    let required: Vec<_> = post.fields().filter(|f| f.is_required()).map(|f| f.name.as_str()).collect();
    assert_eq!(required, ["title", "Poster"]);
  }

  #[test]
  fn rejects_duplicate_field() {
    let mut doc = tag_and_post();
    doc.entities[0].fields.push(FieldDocument::scalar("title", "text"));
    assert!(matches!(
      Schema::compile(doc),
      Err(SchemaError::DuplicateField { entity, field }) if entity == "Post" && field == "title"
    ));
  }

  #[test]
  fn rejects_unknown_scalar_kind() {
    let mut doc = tag_and_post();
    doc.entities[0].fields.push(FieldDocument::scalar("score", "float"));
    assert!(matches!(
      Schema::compile(doc),
      Err(SchemaError::UnknownScalarKind { kind, .. }) if kind == "float"
    ));
  }

  #[test]
  fn rejects_unpaired_relationship() {
    let mut doc = tag_and_post();
    doc.entities[1].fields.pop();
    assert!(matches!(
      Schema::compile(doc),
      Err(SchemaError::UnpairedRelationship { label, field, .. }) if label == "HAS_TAG" && field == "Tags"
    ));
  }

  #[test]
  fn rejects_conflicting_cardinality_on_one_side() {
    let mut doc = tag_and_post();
    doc.entities[0]
      .fields
      .push(FieldDocument::relationship("MainTag", "HAS_TAG", "out", "Tag", "single"));
    let err = Schema::compile(doc).unwrap_err();
    assert!(matches!(err, SchemaError::ConflictingDeclaration { .. }));
    assert!(err.to_string().contains("cardinality"));
  }

  #[test]
  fn rejects_misplaced_modifier() {
    let mut doc = tag_and_post();
    doc.entities[0]
      .fields
      .push(FieldDocument::scalar("slug", "text").modifier("generated-identifier"));
    assert!(matches!(Schema::compile(doc), Err(SchemaError::InvalidField { .. })));
  }

  #[test]
  fn rejects_unknown_target_and_bad_names() {
    let mut doc = tag_and_post();
    doc.entities[0]
      .fields
      .push(FieldDocument::relationship("Author", "BY", "out", "Nobody", "single"));
    assert!(matches!(Schema::compile(doc), Err(SchemaError::UnknownTarget { .. })));

    let mut doc = tag_and_post();
    doc.entities[0].name = "Post-Type".into();
    assert!(matches!(Schema::compile(doc), Err(SchemaError::InvalidName(_))));
  }

  #[test]
  fn rejects_required_update_only_timestamp() {
    let mut doc = tag_and_post();
    doc.entities[0].fields.push(
      FieldDocument::scalar("updatedAt", "timestamp")
        .required()
        .modifier("auto-timestamp-on-update-only"),
    );
    assert!(matches!(Schema::compile(doc), Err(SchemaError::InvalidField { .. })));
  }

  #[test]
  fn rejects_empty_document() {
    assert!(matches!(Schema::compile(SchemaDocument::default()), Err(SchemaError::Empty)));
  }
}
