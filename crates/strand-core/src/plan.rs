//! Static validation of operations into executable plans.
//!
//! Every field, label, value kind, cursor and nesting depth is checked here,
//! against the schema alone. A plan that exists is safe to hand to the
//! store.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
  EngineConfig, Error, Result, cursor,
  instance::{Edge, InstanceId},
  operation::{
    ConnectMode, CreateInput, Filter, Mutation, Page, Query, RelationOp, Selection, Sort,
    SortDirection, UpdateInput,
  },
  predicate::{Predicate, coerce},
  schema::{EntityType, Relationship, Schema},
  value::Value,
};

// ─── Relationship references ─────────────────────────────────────────────────

/// A relationship field resolved on its declaring entity type.
#[derive(Debug, Clone)]
pub(crate) struct RelationRef {
  pub field: String,
  pub owner: String,
  pub rel:   Relationship,
}

impl RelationRef {
  pub(crate) fn resolve(entity: &EntityType, field: &str) -> Result<Self> {
    let rel = entity.require_relationship(field)?;
    Ok(Self { field: field.to_owned(), owner: entity.name.clone(), rel: rel.clone() })
  }

  /// The same edge definition seen from the target side.
  pub(crate) fn partner(&self, schema: &Schema) -> Result<Self> {
    Self::resolve(schema.require_entity(&self.rel.target)?, &self.rel.partner)
  }

  pub(crate) fn edge(&self, owner: InstanceId, other: InstanceId) -> Edge {
    self.rel.edge(owner, &self.owner, other)
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// Resolved pagination for one level.
#[derive(Debug, Clone, Default)]
pub(crate) struct Window {
  pub offset: Option<usize>,
  /// Position of the last record already seen.
  pub after:  Option<usize>,
  pub limit:  Option<usize>,
}

impl Window {
  fn compile(config: &EngineConfig, page: &Page) -> Result<Self> {
    if page.offset.is_some() && page.after.is_some() {
      return Err(Error::validation("offset and after cannot be combined"));
    }
    let after = page.after.as_deref().map(cursor::decode).transpose()?;
    // `start` steps one past the cursor position.
    if after.is_some_and(|position| position.checked_add(1).is_none()) {
      return Err(Error::validation("malformed cursor"));
    }

    let limit = match (page.limit, config.max_limit) {
      (Some(l), Some(max)) if l > max => {
        return Err(Error::validation(format!("limit {l} exceeds the maximum of {max}")));
      }
      (Some(l), _) => Some(l),
      (None, max) => match (config.default_limit, max) {
        (Some(d), Some(max)) => Some(d.min(max)),
        (d, _) => d,
      },
    };

    Ok(Self { offset: page.offset, after, limit })
  }

  /// Index of the first record in the window.
  pub(crate) fn start(&self) -> usize {
    match self.after {
      Some(position) => position + 1,
      None => self.offset.unwrap_or(0),
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct NodePlan {
  pub entity:    String,
  pub filter:    Option<Predicate>,
  pub sort:      Vec<(String, SortDirection)>,
  pub window:    Window,
  pub fields:    Vec<String>,
  pub relations: Vec<RelationPlan>,
}

#[derive(Debug, Clone)]
pub(crate) struct RelationPlan {
  pub rel:  RelationRef,
  pub node: NodePlan,
}

pub(crate) fn query(schema: &Schema, config: &EngineConfig, query: &Query) -> Result<NodePlan> {
  let entity = schema.require_entity(&query.entity)?;
  Level { schema, config, depth: 0 }.node(
    entity,
    query.filter.as_ref(),
    &query.sort,
    &query.page,
    &query.selection,
  )
}

struct Level<'a> {
  schema: &'a Schema,
  config: &'a EngineConfig,
  depth:  usize,
}

impl Level<'_> {
  fn node(
    &self,
    entity: &EntityType,
    filter: Option<&Filter>,
    sort: &[Sort],
    page: &Page,
    selection: &Selection,
  ) -> Result<NodePlan> {
    let filter =
      filter.map(|f| Predicate::compile(self.schema, self.config, entity, f)).transpose()?;

    let sort = sort
      .iter()
      .map(|s| {
        let field = entity.require_field(&s.field)?;
        if field.scalar().is_none() {
          return Err(Error::invalid_field(&entity.name, &s.field, "cannot sort by a relationship"));
        }
        Ok((s.field.clone(), s.direction))
      })
      .collect::<Result<_>>()?;

    let window = Window::compile(self.config, page)?;

    let mut keys = BTreeSet::new();
    let mut claim = |key: &str| {
      if keys.insert(key.to_owned()) {
        Ok(())
      } else {
        Err(Error::invalid_field(&entity.name, key, "selected more than once"))
      }
    };

    let mut fields = Vec::with_capacity(selection.fields.len());
    for name in &selection.fields {
      let field = entity.require_field(name)?;
      if field.scalar().is_none() {
        return Err(Error::invalid_field(
          &entity.name,
          name,
          "relationship fields need a nested selection",
        ));
      }
      claim(name)?;
      fields.push(name.clone());
    }

    let mut relations = Vec::with_capacity(selection.relations.len());
    for sub in &selection.relations {
      let rel = RelationRef::resolve(entity, &sub.field)?;
      claim(&sub.field)?;

      let depth = self.depth + 1;
      if depth > self.config.max_depth {
        return Err(Error::invalid_field(
          &entity.name,
          &sub.field,
          format!("nesting exceeds the maximum depth of {}", self.config.max_depth),
        ));
      }

      let target = self.schema.require_entity(&rel.rel.target)?;
      let level = Level { depth, ..*self };
      let node = level.node(target, sub.filter.as_ref(), &sub.sort, &sub.page, &sub.selection)?;
      relations.push(RelationPlan { rel, node });
    }

    Ok(NodePlan { entity: entity.name.clone(), filter, sort, window, fields, relations })
  }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct CreatePlan {
  pub entity:    String,
  pub id:        Option<InstanceId>,
  /// Coerced, non-null caller values.
  pub values:    BTreeMap<String, Value>,
  pub relations: Vec<RelOpPlan>,
}

#[derive(Debug, Clone)]
pub(crate) struct UpdatePlan {
  /// `Null` entries clear the field.
  pub values:    BTreeMap<String, Value>,
  pub relations: Vec<RelOpPlan>,
}

#[derive(Debug, Clone)]
pub(crate) struct RelOpPlan {
  pub rel: RelationRef,
  pub op:  RelOp,
}

#[derive(Debug, Clone)]
pub(crate) enum RelOp {
  Create(CreatePlan),
  Connect { target: Predicate, mode: ConnectMode },
  Disconnect { target: Option<Predicate> },
}

#[derive(Debug, Clone)]
pub(crate) enum MutationPlan {
  Create(CreatePlan),
  Update {
    entity: String,
    filter: Option<Predicate>,
    input:  UpdatePlan,
  },
  Delete {
    entity: String,
    filter: Option<Predicate>,
  },
  Connect {
    entity: String,
    filter: Option<Predicate>,
    rel:    RelationRef,
    target: Predicate,
    mode:   ConnectMode,
  },
  Disconnect {
    entity: String,
    filter: Option<Predicate>,
    rel:    RelationRef,
    target: Option<Predicate>,
  },
}

pub(crate) fn mutation(
  schema: &Schema,
  config: &EngineConfig,
  mutation: &Mutation,
) -> Result<MutationPlan> {
  let check = Checker { schema, config };
  let entity = schema.require_entity(mutation.entity())?;
  let filter = |f: &Option<Filter>| {
    f.as_ref().map(|f| Predicate::compile(schema, config, entity, f)).transpose()
  };

  Ok(match mutation {
    Mutation::Create { input, .. } => MutationPlan::Create(check.create(entity, input, None)?),
    Mutation::Update { filter: f, input, .. } => MutationPlan::Update {
      entity: entity.name.clone(),
      filter: filter(f)?,
      input:  check.update(entity, input)?,
    },
    Mutation::Delete { filter: f, .. } => {
      MutationPlan::Delete { entity: entity.name.clone(), filter: filter(f)? }
    }
    Mutation::Connect { filter: f, field, target, mode, .. } => {
      let rel = RelationRef::resolve(entity, field)?;
      let target = check.target(&rel, target)?;
      MutationPlan::Connect {
        entity: entity.name.clone(),
        filter: filter(f)?,
        rel,
        target,
        mode: *mode,
      }
    }
    Mutation::Disconnect { filter: f, field, target, .. } => {
      let rel = RelationRef::resolve(entity, field)?;
      let target = target.as_ref().map(|t| check.target(&rel, t)).transpose()?;
      MutationPlan::Disconnect { entity: entity.name.clone(), filter: filter(f)?, rel, target }
    }
  })
}

struct Checker<'a> {
  schema: &'a Schema,
  config: &'a EngineConfig,
}

impl Checker<'_> {
  /// `linked_by` names the field already satisfied by the parent of a
  /// nested create.
  fn create(
    &self,
    entity: &EntityType,
    input: &CreateInput,
    linked_by: Option<&str>,
  ) -> Result<CreatePlan> {
    let mut values = self.values(entity, &input.values)?;
    values.retain(|_, v| !v.is_null());

    let relations = self.relations(entity, &input.relations, true)?;

    for field in entity.fields().filter(|f| f.is_required()) {
      let satisfied = match field.relationship() {
        None => values.contains_key(&field.name),
        Some(_) => {
          linked_by == Some(field.name.as_str())
            || relations.iter().any(|r| r.rel.field == field.name)
        }
      };
      if !satisfied {
        return Err(Error::invalid_field(&entity.name, &field.name, "required field is missing"));
      }
    }

    Ok(CreatePlan { entity: entity.name.clone(), id: input.id, values, relations })
  }

  fn update(&self, entity: &EntityType, input: &UpdateInput) -> Result<UpdatePlan> {
    let values = self.values(entity, &input.values)?;
    for (name, value) in &values {
      if value.is_null() && entity.field(name).is_some_and(|f| !f.nullable) {
        return Err(Error::invalid_field(&entity.name, name, "field cannot be cleared"));
      }
    }
    let relations = self.relations(entity, &input.relations, false)?;
    Ok(UpdatePlan { values, relations })
  }

  fn values(
    &self,
    entity: &EntityType,
    values: &BTreeMap<String, Value>,
  ) -> Result<BTreeMap<String, Value>> {
    let mut out = BTreeMap::new();
    for (name, value) in values {
      let field = entity.require_field(name)?;
      let Some(kind) = field.scalar() else {
        return Err(Error::invalid_field(&entity.name, name, "set relationships through relations"));
      };
      if field.is_managed() {
        return Err(Error::invalid_field(
          &entity.name,
          name,
          "value is maintained by the engine and cannot be supplied",
        ));
      }
      out.insert(name.clone(), coerce(entity, name, kind, value.clone())?);
    }
    Ok(out)
  }

  fn relations(
    &self,
    entity: &EntityType,
    relations: &BTreeMap<String, Vec<RelationOp>>,
    creating: bool,
  ) -> Result<Vec<RelOpPlan>> {
    let mut out = Vec::new();
    for (field, ops) in relations {
      let rel = RelationRef::resolve(entity, field)?;

      let attaching = ops.iter().filter(|op| !matches!(op, RelationOp::Disconnect { .. })).count();
      if rel.rel.is_single() && attaching > 1 {
        return Err(Error::invalid_field(
          &entity.name,
          field,
          "single relationship takes at most one create or connect",
        ));
      }

      for op in ops {
        let op = match op {
          RelationOp::Create(input) => {
            let target = self.schema.require_entity(&rel.rel.target)?;
            RelOp::Create(self.create(target, input, Some(&rel.rel.partner))?)
          }
          RelationOp::Connect { target, mode } => {
            RelOp::Connect { target: self.target(&rel, target)?, mode: *mode }
          }
          RelationOp::Disconnect { .. } if creating => {
            return Err(Error::invalid_field(&entity.name, field, "nothing to disconnect on create"));
          }
          RelationOp::Disconnect { target } => RelOp::Disconnect {
            target: target.as_ref().map(|t| self.target(&rel, t)).transpose()?,
          },
        };
        out.push(RelOpPlan { rel: rel.clone(), op });
      }
    }
    Ok(out)
  }

  fn target(&self, rel: &RelationRef, filter: &Filter) -> Result<Predicate> {
    let target = self.schema.require_entity(&rel.rel.target)?;
    Predicate::compile(self.schema, self.config, target, filter)
  }
}
