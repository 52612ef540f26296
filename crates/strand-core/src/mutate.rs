//! Mutation execution inside one write transaction.
//!
//! Each step runs against the open transaction; any error unwinds to the
//! store, which rolls the whole unit back.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::{
  Error, Result,
  error::ViolationKind,
  instance::{Instance, InstanceId},
  operation::ConnectMode,
  plan::{CreatePlan, MutationPlan, RelOp, RelOpPlan, RelationRef, UpdatePlan},
  predicate::Predicate,
  record::{MutationInfo, MutationResult},
  resolve::Traversal,
  schema::{EntityType, OnDelete, Schema},
  store::WriteTxn,
  value::Value,
};

pub(crate) fn apply(
  schema: &Schema,
  txn: &mut dyn WriteTxn,
  plan: &MutationPlan,
) -> Result<MutationResult> {
  let mut exec = Executor {
    schema,
    txn,
    now: Utc::now(),
    info: MutationInfo::default(),
    detached: BTreeSet::new(),
  };

  let instances = match plan {
    MutationPlan::Create(create) => vec![exec.create(create)?],
    MutationPlan::Update { entity, filter, input } => exec.update(entity, filter.as_ref(), input)?,
    MutationPlan::Delete { entity, filter } => exec.delete(entity, filter.as_ref())?,
    MutationPlan::Connect { entity, filter, rel, target, mode } => {
      let owners = exec.find(entity, filter.as_ref())?;
      for owner in &owners {
        exec.connect_matching(owner, rel, target, *mode)?;
      }
      owners
    }
    MutationPlan::Disconnect { entity, filter, rel, target } => {
      let owners = exec.find(entity, filter.as_ref())?;
      for owner in &owners {
        exec.disconnect(owner, rel, target.as_ref())?;
      }
      owners
    }
  };

  exec.check_required_edges()?;

  Ok(MutationResult { count: instances.len(), instances, info: exec.info })
}

struct Executor<'a> {
  schema:   &'a Schema,
  txn:      &'a mut dyn WriteTxn,
  now:      DateTime<Utc>,
  info:     MutationInfo,
  /// Surviving instances that lost an edge during this mutation.
  detached: BTreeSet<InstanceId>,
}

impl Executor<'_> {
  fn find(&self, entity: &str, filter: Option<&Predicate>) -> Result<Vec<Instance>> {
    Traversal::new(&*self.txn).matching(entity, filter)
  }

  // ─── Create ───────────────────────────────────────────────────────────

  fn create(&mut self, plan: &CreatePlan) -> Result<Instance> {
    let schema = self.schema;
    let entity = schema.require_entity(&plan.entity)?;

    let id = plan.id.unwrap_or_default();
    if plan.id.is_some() && self.txn.get(id)?.is_some() {
      return Err(Error::violation(
        ViolationKind::Unique,
        &entity.name,
        None,
        format!("instance {id} already exists"),
      ));
    }

    let mut instance = Instance::new(id, &entity.name);
    instance.values = plan.values.clone();
    for field in entity.fields() {
      if field.is_generated() {
        instance.values.insert(field.name.clone(), Value::Id(id.to_string()));
      } else if field.stamps_on_create() {
        instance.values.insert(field.name.clone(), Value::Timestamp(self.now));
      }
    }

    self.check_unique(entity, &instance)?;
    self.txn.insert(&instance)?;
    self.info.nodes_created += 1;
    trace!(entity = %entity.name, %id, "instance created");

    for op in &plan.relations {
      self.relate(&instance, op)?;
    }
    Ok(instance)
  }

  // ─── Update ───────────────────────────────────────────────────────────

  fn update(
    &mut self,
    entity: &str,
    filter: Option<&Predicate>,
    input: &UpdatePlan,
  ) -> Result<Vec<Instance>> {
    let schema = self.schema;
    let entity = schema.require_entity(entity)?;
    let targets = self.find(&entity.name, filter)?;

    let mut updated = Vec::with_capacity(targets.len());
    for mut instance in targets {
      for (field, value) in &input.values {
        if value.is_null() {
          instance.values.remove(field);
        } else {
          instance.values.insert(field.clone(), value.clone());
        }
      }

      for field in entity.fields().filter(|f| f.stamps_on_update()) {
        let stamp = self.next_stamp(instance.get(&field.name));
        instance.values.insert(field.name.clone(), Value::Timestamp(stamp));
      }

      self.check_unique(entity, &instance)?;
      self.txn.update(&instance)?;
      self.info.nodes_updated += 1;

      for op in &input.relations {
        self.relate(&instance, op)?;
      }
      self.detached.insert(instance.id);
      updated.push(instance);
    }
    Ok(updated)
  }

  /// A stamp strictly later than `previous`, even if the clock has not
  /// moved.
  fn next_stamp(&self, previous: &Value) -> DateTime<Utc> {
    match previous {
      Value::Timestamp(prev) if self.now <= *prev => *prev + Duration::microseconds(1),
      _ => self.now,
    }
  }

  // ─── Delete ───────────────────────────────────────────────────────────

  fn delete(&mut self, entity: &str, filter: Option<&Predicate>) -> Result<Vec<Instance>> {
    let targets = self.find(entity, filter)?;
    let mut removed = BTreeSet::new();
    for instance in &targets {
      self.remove(instance, &mut removed)?;
    }
    Ok(targets)
  }

  fn remove(&mut self, instance: &Instance, removed: &mut BTreeSet<InstanceId>) -> Result<()> {
    if !removed.insert(instance.id) {
      return Ok(());
    }
    let schema = self.schema;
    let entity = schema.require_entity(&instance.entity)?;

    let mut cascade = Vec::new();
    for (field, rel) in entity.relationships() {
      if rel.on_delete == OnDelete::Cascade {
        let rel = RelationRef::resolve(entity, &field.name)?;
        cascade.extend(Traversal::new(&*self.txn).related(instance.id, &rel)?);
      }
    }

    self.info.relationships_deleted += self.txn.remove(instance.id)?;
    self.info.nodes_deleted += 1;
    trace!(entity = %entity.name, id = %instance.id, "instance deleted");

    for other in &cascade {
      self.remove(other, removed)?;
    }
    Ok(())
  }

  // ─── Relationships ────────────────────────────────────────────────────

  fn relate(&mut self, owner: &Instance, op: &RelOpPlan) -> Result<()> {
    match &op.op {
      RelOp::Create(plan) => {
        let child = self.create(plan)?;
        self.connect(owner, &op.rel, child.id, ConnectMode::Replace)
      }
      RelOp::Connect { target, mode } => self.connect_matching(owner, &op.rel, target, *mode),
      RelOp::Disconnect { target } => self.disconnect(owner, &op.rel, target.as_ref()),
    }
  }

  fn connect_matching(
    &mut self,
    owner: &Instance,
    rel: &RelationRef,
    target: &Predicate,
    mode: ConnectMode,
  ) -> Result<()> {
    let targets = self.find(&rel.rel.target, Some(target))?;
    if targets.is_empty() {
      return Err(Error::violation(
        ViolationKind::DanglingReference,
        &rel.owner,
        Some(&rel.field),
        format!("no {} matches the connect target", rel.rel.target),
      ));
    }
    if rel.rel.is_single() && targets.len() > 1 {
      return Err(Error::violation(
        ViolationKind::Cardinality,
        &rel.owner,
        Some(&rel.field),
        format!("connect target matches {} instances", targets.len()),
      ));
    }
    for other in &targets {
      self.connect(owner, rel, other.id, mode)?;
    }
    Ok(())
  }

  /// Link `owner` to `other` through `rel`, enforcing single cardinality on
  /// both endpoints.
  fn connect(
    &mut self,
    owner: &Instance,
    rel: &RelationRef,
    other: InstanceId,
    mode: ConnectMode,
  ) -> Result<()> {
    let existing = self.txn.neighbors(owner.id, &rel.rel.label, rel.rel.direction, &rel.rel.target)?;
    if existing.contains(&other) {
      return Ok(());
    }

    self.make_room(owner.id, rel, &existing, mode)?;

    let partner = rel.partner(self.schema)?;
    let theirs =
      self.txn.neighbors(other, &partner.rel.label, partner.rel.direction, &partner.rel.target)?;
    self.make_room(other, &partner, &theirs, mode)?;

    if self.txn.link(&rel.edge(owner.id, other))? {
      self.info.relationships_created += 1;
    }
    Ok(())
  }

  /// Free a single-cardinality side before a new edge is added to it.
  fn make_room(
    &mut self,
    id: InstanceId,
    rel: &RelationRef,
    existing: &[InstanceId],
    mode: ConnectMode,
  ) -> Result<()> {
    if !rel.rel.is_single() || existing.is_empty() {
      return Ok(());
    }
    if mode == ConnectMode::IfAbsent {
      return Err(Error::violation(
        ViolationKind::Cardinality,
        &rel.owner,
        Some(&rel.field),
        format!("{id} is already connected"),
      ));
    }
    for &old in existing {
      self.unlink(id, rel, old)?;
    }
    Ok(())
  }

  fn disconnect(
    &mut self,
    owner: &Instance,
    rel: &RelationRef,
    target: Option<&Predicate>,
  ) -> Result<()> {
    let doomed = {
      let mut graph = Traversal::new(&*self.txn);
      let mut doomed = Vec::new();
      for other in graph.related(owner.id, rel)? {
        let hit = match target {
          Some(p) => p.eval(&other, &mut graph)?,
          None => true,
        };
        if hit {
          doomed.push(other.id);
        }
      }
      doomed
    };

    for other in doomed {
      self.unlink(owner.id, rel, other)?;
    }
    Ok(())
  }

  fn unlink(&mut self, owner: InstanceId, rel: &RelationRef, other: InstanceId) -> Result<()> {
    if self.txn.unlink(&rel.edge(owner, other))? {
      self.info.relationships_deleted += 1;
      self.detached.insert(owner);
      self.detached.insert(other);
    }
    Ok(())
  }

  // ─── Checks ───────────────────────────────────────────────────────────

  /// Pre-check against the unique index; the store enforces the same rule
  /// again on write.
  fn check_unique(&self, entity: &EntityType, instance: &Instance) -> Result<()> {
    for field in entity.fields().filter(|f| f.is_unique()) {
      let value = instance.get(&field.name);
      if value.is_null() {
        continue;
      }
      let holders = self.txn.lookup(&entity.name, &field.name, value)?;
      if holders.iter().any(|&id| id != instance.id) {
        return Err(Error::violation(
          ViolationKind::Unique,
          &entity.name,
          Some(&field.name),
          format!("{} is already taken", value.index_key().unwrap_or_default()),
        ));
      }
    }
    Ok(())
  }

  /// Every touched instance still holds its required single relationships.
  fn check_required_edges(&self) -> Result<()> {
    for &id in &self.detached {
      let Some(instance) = self.txn.get(id)? else { continue };
      let entity = self.schema.require_entity(&instance.entity)?;
      for (field, rel) in entity.relationships() {
        if field.nullable || !rel.is_single() {
          continue;
        }
        if self.txn.neighbors(id, &rel.label, rel.direction, &rel.target)?.is_empty() {
          return Err(Error::violation(
            ViolationKind::Cardinality,
            &entity.name,
            Some(&field.name),
            format!("required relationship of {id} would be left empty"),
          ));
        }
      }
    }
    Ok(())
  }
}
