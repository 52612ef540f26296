use serde::{Deserialize, Serialize};

use super::Filter;

/// A read against one entity type with a nested selection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Query {
  pub entity:    String,
  #[serde(default)]
  pub filter:    Option<Filter>,
  #[serde(default)]
  pub sort:      Vec<Sort>,
  #[serde(default)]
  pub page:      Page,
  #[serde(default)]
  pub selection: Selection,
}

impl Query {
  pub fn new(entity: impl Into<String>) -> Self {
    Self { entity: entity.into(), ..Default::default() }
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn sort(mut self, sort: Sort) -> Self {
    self.sort.push(sort);
    self
  }

  pub fn page(mut self, page: Page) -> Self {
    self.page = page;
    self
  }

  pub fn select(mut self, selection: Selection) -> Self {
    self.selection = selection;
    self
  }
}

/// Which fields and relationship sub-queries to return.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
  #[serde(default)]
  pub fields:    Vec<String>,
  #[serde(default)]
  pub relations: Vec<RelationQuery>,
}

impl Selection {
  pub fn fields<I, S>(fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self { fields: fields.into_iter().map(Into::into).collect(), relations: Vec::new() }
  }

  pub fn relation(mut self, relation: RelationQuery) -> Self {
    self.relations.push(relation);
    self
  }
}

/// A nested traversal through one relationship field.
///
/// The filter restricts which related instances are included; it never
/// removes the parent. Pagination applies per parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationQuery {
  pub field:     String,
  #[serde(default)]
  pub filter:    Option<Filter>,
  #[serde(default)]
  pub sort:      Vec<Sort>,
  #[serde(default)]
  pub page:      Page,
  #[serde(default)]
  pub selection: Selection,
}

impl RelationQuery {
  pub fn new(field: impl Into<String>, selection: Selection) -> Self {
    Self { field: field.into(), selection, ..Default::default() }
  }

  pub fn filter(mut self, filter: Filter) -> Self {
    self.filter = Some(filter);
    self
  }

  pub fn sort(mut self, sort: Sort) -> Self {
    self.sort.push(sort);
    self
  }

  pub fn page(mut self, page: Page) -> Self {
    self.page = page;
    self
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
  #[default]
  Asc,
  Desc,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sort {
  pub field:     String,
  #[serde(default)]
  pub direction: SortDirection,
}

impl Sort {
  pub fn asc(field: impl Into<String>) -> Self {
    Self { field: field.into(), direction: SortDirection::Asc }
  }

  pub fn desc(field: impl Into<String>) -> Self {
    Self { field: field.into(), direction: SortDirection::Desc }
  }
}

/// Offset/limit or cursor pagination. `offset` and `after` are mutually
/// exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
  #[serde(default)]
  pub offset: Option<usize>,
  #[serde(default)]
  pub limit:  Option<usize>,
  /// Cursor of the last record already seen.
  #[serde(default)]
  pub after:  Option<String>,
}

impl Page {
  pub fn limit(limit: usize) -> Self { Self { limit: Some(limit), ..Default::default() } }

  pub fn offset(offset: usize, limit: usize) -> Self {
    Self { offset: Some(offset), limit: Some(limit), after: None }
  }

  pub fn after(cursor: impl Into<String>, limit: usize) -> Self {
    Self { offset: None, limit: Some(limit), after: Some(cursor.into()) }
  }
}
