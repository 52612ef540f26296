//! Validation and compilation of a [`SchemaDocument`] into the typed model.

use std::collections::{HashMap, HashSet};

use super::{
  Cardinality, Direction, EdgeDefinition, EntityType, Field, FieldDocument, FieldKind,
  Modifier, OnDelete, Relationship, ScalarKind, SchemaDocument, SchemaError,
};

/// One side of an edge definition: (entity, field, cardinality).
type Side = (String, String, Cardinality);

pub(super) fn compile(
  doc: SchemaDocument,
) -> Result<(Vec<EntityType>, Vec<EdgeDefinition>), SchemaError> {
  if doc.entities.is_empty() {
    return Err(SchemaError::Empty);
  }

  let mut seen = HashSet::new();
  for entity in &doc.entities {
    check_name(&entity.name)?;
    if !seen.insert(entity.name.as_str()) {
      return Err(SchemaError::DuplicateEntity(entity.name.clone()));
    }
  }

  let mut compiled: Vec<(String, Vec<Field>)> = Vec::with_capacity(doc.entities.len());
  for entity in &doc.entities {
    let mut names = HashSet::new();
    let mut fields = Vec::with_capacity(entity.fields.len());
    for field in &entity.fields {
      check_name(&field.name)?;
      if !names.insert(field.name.as_str()) {
        return Err(SchemaError::DuplicateField {
          entity: entity.name.clone(),
          field:  field.name.clone(),
        });
      }
      fields.push(compile_field(&entity.name, field, &seen)?);
    }
    if let Some(extra) = fields.iter().filter(|f| f.is_generated()).nth(1) {
      return Err(invalid(&entity.name, &extra.name, "second generated-identifier field"));
    }
    compiled.push((entity.name.clone(), fields));
  }

  let edges = pair_relationships(&mut compiled)?;

  let entities = compiled
    .into_iter()
    .map(|(name, fields)| EntityType::new(name, fields))
    .collect();
  Ok((entities, edges))
}

fn check_name(name: &str) -> Result<(), SchemaError> {
  let mut chars = name.chars();
  let ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
  if ok { Ok(()) } else { Err(SchemaError::InvalidName(name.to_owned())) }
}

fn invalid(entity: &str, field: &str, detail: impl Into<String>) -> SchemaError {
  SchemaError::InvalidField {
    entity: entity.to_owned(),
    field:  field.to_owned(),
    detail: detail.into(),
  }
}

fn compile_field(
  entity: &str,
  doc: &FieldDocument,
  entities: &HashSet<&str>,
) -> Result<Field, SchemaError> {
  let mut modifiers = Vec::with_capacity(doc.modifiers.len());
  for raw in &doc.modifiers {
    let modifier = Modifier::parse(raw).ok_or_else(|| SchemaError::UnknownModifier {
      entity:   entity.to_owned(),
      field:    doc.name.clone(),
      modifier: raw.clone(),
    })?;
    if modifiers.contains(&modifier) {
      return Err(invalid(entity, &doc.name, format!("modifier {raw:?} given twice")));
    }
    modifiers.push(modifier);
  }

  let kind = match (&doc.kind, &doc.relationship) {
    (Some(_), Some(_)) => {
      return Err(invalid(entity, &doc.name, "declares both a scalar kind and a relationship"));
    }
    (None, None) => {
      return Err(invalid(entity, &doc.name, "declares neither a scalar kind nor a relationship"));
    }
    (Some(raw), None) => {
      let scalar: ScalarKind = raw.parse().map_err(|_| SchemaError::UnknownScalarKind {
        entity: entity.to_owned(),
        field:  doc.name.clone(),
        kind:   raw.clone(),
      })?;
      if doc.cardinality.is_some() || doc.on_delete.is_some() {
        return Err(invalid(entity, &doc.name, "cardinality and on_delete apply to relationships only"));
      }
      for m in &modifiers {
        check_scalar_modifier(entity, &doc.name, scalar, *m)?;
      }
      FieldKind::Scalar(scalar)
    }
    (None, Some(rel)) => {
      if !modifiers.is_empty() {
        return Err(invalid(entity, &doc.name, "relationship fields take no modifiers"));
      }
      check_name(&rel.label)?;
      if !entities.contains(rel.target.as_str()) {
        return Err(SchemaError::UnknownTarget {
          entity: entity.to_owned(),
          field:  doc.name.clone(),
          target: rel.target.clone(),
        });
      }
      let direction: Direction = rel
        .direction
        .parse()
        .map_err(|_| invalid(entity, &doc.name, format!("unknown direction {:?}", rel.direction)))?;
      let cardinality: Cardinality = match &doc.cardinality {
        Some(raw) => raw
          .parse()
          .map_err(|_| invalid(entity, &doc.name, format!("unknown cardinality {raw:?}")))?,
        None => Cardinality::Single,
      };
      let on_delete: OnDelete = match &doc.on_delete {
        Some(raw) => raw
          .parse()
          .map_err(|_| invalid(entity, &doc.name, format!("unknown on_delete policy {raw:?}")))?,
        None => OnDelete::Detach,
      };
      FieldKind::Relationship(Relationship {
        label: rel.label.clone(),
        direction,
        cardinality,
        target: rel.target.clone(),
        partner: String::new(),
        on_delete,
      })
    }
  };

  let field = Field { name: doc.name.clone(), kind, nullable: doc.nullable, modifiers };

  // A non-nullable field that only the update path stamps could never be
  // valid right after a create.
  if !field.nullable
    && field.stamps_on_update()
    && !field.stamps_on_create()
  {
    return Err(invalid(entity, &doc.name, "non-nullable update-only timestamp is unset after create"));
  }

  Ok(field)
}

fn check_scalar_modifier(
  entity: &str,
  field: &str,
  kind: ScalarKind,
  modifier: Modifier,
) -> Result<(), SchemaError> {
  let ok = match modifier {
    Modifier::Unique => true,
    Modifier::GeneratedIdentifier => kind == ScalarKind::Id,
    Modifier::TimestampOnCreate | Modifier::TimestampOnUpdate { .. } => {
      kind == ScalarKind::Timestamp
    }
  };
  if ok {
    Ok(())
  } else {
    Err(invalid(entity, field, format!("modifier {:?} does not apply to {kind} fields", modifier.as_str())))
  }
}

/// Pair every relationship declaration with its opposite side and record
/// the partner field name on both.
fn pair_relationships(
  entities: &mut [(String, Vec<Field>)],
) -> Result<Vec<EdgeDefinition>, SchemaError> {
  // (label, source entity, target entity) → (out side, in side)
  let mut sides: HashMap<(String, String, String), (Option<Side>, Option<Side>)> = HashMap::new();
  let mut order = Vec::new();

  for (entity, fields) in entities.iter() {
    for field in fields {
      let Some(rel) = field.relationship() else { continue };
      let key = match rel.direction {
        Direction::Out => (rel.label.clone(), entity.clone(), rel.target.clone()),
        Direction::In => (rel.label.clone(), rel.target.clone(), entity.clone()),
      };
      let slot = sides.entry(key.clone()).or_insert_with(|| {
        order.push(key.clone());
        (None, None)
      });
      let side = match rel.direction {
        Direction::Out => &mut slot.0,
        Direction::In => &mut slot.1,
      };
      if let Some((_, other, other_cardinality)) = side {
        let detail = if *other_cardinality != rel.cardinality {
          format!(" with cardinality {other_cardinality} (this one says {})", rel.cardinality)
        } else {
          String::new()
        };
        return Err(SchemaError::ConflictingDeclaration {
          label: rel.label.clone(),
          entity: entity.clone(),
          field: field.name.clone(),
          other: other.clone(),
          detail,
        });
      }
      *side = Some((entity.clone(), field.name.clone(), rel.cardinality));
    }
  }

  let mut edges = Vec::with_capacity(order.len());
  let mut partners: HashMap<(String, String), String> = HashMap::new();
  for key in order {
    let (label, source, target) = key.clone();
    match sides.remove(&key) {
      Some((Some(out), Some(inn))) => {
        partners.insert((out.0.clone(), out.1.clone()), inn.1.clone());
        partners.insert((inn.0.clone(), inn.1.clone()), out.1.clone());
        edges.push(EdgeDefinition {
          label,
          source,
          target,
          out_field: out.1,
          in_field: inn.1,
        });
      }
      Some((Some((entity, field, _)), None)) | Some((None, Some((entity, field, _)))) => {
        let other = if entity == source { target } else { source };
        return Err(SchemaError::UnpairedRelationship { label, entity, field, target: other });
      }
      _ => {}
    }
  }

  for (entity, fields) in entities.iter_mut() {
    for field in fields.iter_mut() {
      if let FieldKind::Relationship(rel) = &mut field.kind
        && let Some(partner) = partners.get(&(entity.clone(), field.name.clone()))
      {
        rel.partner = partner.clone();
      }
    }
  }

  Ok(edges)
}
