//! Traversal query resolution against one store snapshot.

use std::{
  cmp::Ordering,
  collections::{HashMap, hash_map::Entry},
};

use crate::{
  Result, cursor,
  instance::{Instance, InstanceId},
  operation::SortDirection,
  plan::{NodePlan, RelationRef},
  predicate::Predicate,
  record::{Node, PageInfo, QueryResult, Record},
  store::Snapshot,
};

/// Per-operation read cache over a snapshot. Every instance and every
/// neighbour list is fetched at most once.
pub(crate) struct Traversal<'a, S: Snapshot + ?Sized> {
  snapshot:  &'a S,
  instances: HashMap<InstanceId, Option<Instance>>,
  neighbors: HashMap<(InstanceId, String, String), Vec<InstanceId>>,
}

impl<'a, S: Snapshot + ?Sized> Traversal<'a, S> {
  pub(crate) fn new(snapshot: &'a S) -> Self {
    Self { snapshot, instances: HashMap::new(), neighbors: HashMap::new() }
  }

  pub(crate) fn instance(&mut self, id: InstanceId) -> Result<Option<Instance>> {
    match self.instances.entry(id) {
      Entry::Occupied(e) => Ok(e.get().clone()),
      Entry::Vacant(e) => Ok(e.insert(self.snapshot.get(id)?).clone()),
    }
  }

  /// Instances at the other end of `rel` from `id`, in edge order.
  pub(crate) fn related(&mut self, id: InstanceId, rel: &RelationRef) -> Result<Vec<Instance>> {
    let key = (id, rel.owner.clone(), rel.field.clone());
    let ids = match self.neighbors.entry(key) {
      Entry::Occupied(e) => e.get().clone(),
      Entry::Vacant(e) => e
        .insert(self.snapshot.neighbors(id, &rel.rel.label, rel.rel.direction, &rel.rel.target)?)
        .clone(),
    };
    self.load(ids)
  }

  /// Instances of `entity` satisfying `filter`, in creation order.
  pub(crate) fn matching(
    &mut self,
    entity: &str,
    filter: Option<&Predicate>,
  ) -> Result<Vec<Instance>> {
    let candidates = match filter.and_then(Predicate::index_hint) {
      Some((field, value)) => {
        let ids = self.snapshot.lookup(entity, field, value)?;
        self.load(ids)?
      }
      None => {
        let all = self.snapshot.scan(entity)?;
        for instance in &all {
          self.instances.insert(instance.id, Some(instance.clone()));
        }
        all
      }
    };
    self.retain(candidates, filter)
  }

  fn load(&mut self, ids: Vec<InstanceId>) -> Result<Vec<Instance>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
      if let Some(instance) = self.instance(id)? {
        out.push(instance);
      }
    }
    Ok(out)
  }

  fn retain(&mut self, items: Vec<Instance>, filter: Option<&Predicate>) -> Result<Vec<Instance>> {
    let Some(filter) = filter else { return Ok(items) };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
      if filter.eval(&item, self)? {
        out.push(item);
      }
    }
    Ok(out)
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

pub(crate) fn run<S: Snapshot + ?Sized>(snapshot: &S, plan: &NodePlan) -> Result<QueryResult> {
  let mut graph = Traversal::new(snapshot);
  let matches = graph.matching(&plan.entity, plan.filter.as_ref())?;
  let (page, total_count, page_info) = arrange(matches, plan);

  let records = page
    .iter()
    .map(|instance| project(&mut graph, instance, plan))
    .collect::<Result<_>>()?;

  Ok(QueryResult { records, total_count, page_info })
}

/// Sort and window an already filtered list.
fn arrange(mut items: Vec<Instance>, plan: &NodePlan) -> (Vec<Instance>, usize, PageInfo) {
  if !plan.sort.is_empty() {
    // Stable, so ties keep creation order.
    items.sort_by(|a, b| {
      plan.sort.iter().fold(Ordering::Equal, |acc, (field, direction)| {
        acc.then_with(|| {
          let ord = a.get(field).compare(b.get(field));
          match direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
          }
        })
      })
    });
  }

  let total = items.len();
  let start = plan.window.start().min(total);
  let limit = plan.window.limit.unwrap_or(usize::MAX);
  let page: Vec<_> = items.into_iter().skip(start).take(limit).collect();

  let end = start + page.len();
  let page_info = PageInfo {
    end_cursor:    (!page.is_empty()).then(|| cursor::encode(end - 1)),
    has_next_page: end < total,
  };
  (page, total, page_info)
}

fn project<S: Snapshot + ?Sized>(
  graph: &mut Traversal<'_, S>,
  instance: &Instance,
  plan: &NodePlan,
) -> Result<Record> {
  let mut record = Record::default();

  for field in &plan.fields {
    record.0.insert(field.clone(), Node::Scalar(instance.get(field).clone()));
  }

  for sub in &plan.relations {
    let related = graph.related(instance.id, &sub.rel)?;
    let related = graph.retain(related, sub.node.filter.as_ref())?;
    let (page, ..) = arrange(related, &sub.node);

    let node = if sub.rel.rel.is_single() {
      match page.first() {
        Some(other) => Node::One(Some(Box::new(project(graph, other, &sub.node)?))),
        None => Node::One(None),
      }
    } else {
      Node::Many(
        page
          .iter()
          .map(|other| project(graph, other, &sub.node))
          .collect::<Result<_>>()?,
      )
    };
    record.0.insert(sub.rel.field.clone(), node);
  }

  Ok(record)
}
