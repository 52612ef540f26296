//! Filters compiled against the schema, and their evaluation.

use regex_lite::Regex;

use crate::{
  EngineConfig, Error, Result,
  instance::Instance,
  operation::{CompareOp, Filter, Quantifier},
  plan::RelationRef,
  resolve::Traversal,
  schema::{EntityType, ScalarKind, Schema},
  store::Snapshot,
  value::Value,
};

/// A [`Filter`] whose field references, value kinds and regular
/// expressions have been checked.
#[derive(Debug, Clone)]
pub(crate) enum Predicate {
  And(Vec<Predicate>),
  Or(Vec<Predicate>),
  Not(Box<Predicate>),
  Compare {
    field:   String,
    op:      CompareOp,
    value:   Value,
    indexed: bool,
  },
  Matches {
    field: String,
    regex: Regex,
  },
  In {
    field:  String,
    values: Vec<Value>,
  },
  IsNull {
    field:   String,
    is_null: bool,
  },
  Relation {
    rel:        RelationRef,
    quantifier: Quantifier,
    inner:      Option<Box<Predicate>>,
  },
}

impl Predicate {
  pub(crate) fn compile(
    schema: &Schema,
    config: &EngineConfig,
    entity: &EntityType,
    filter: &Filter,
  ) -> Result<Self> {
    let compile = |f: &Filter| Self::compile(schema, config, entity, f);

    Ok(match filter {
      Filter::And(all) => Self::And(all.iter().map(compile).collect::<Result<_>>()?),
      Filter::Or(any) => Self::Or(any.iter().map(compile).collect::<Result<_>>()?),
      Filter::Not(inner) => Self::Not(Box::new(compile(&**inner)?)),
      Filter::Compare { field, op, value } => {
        let f = entity.require_field(field)?;
        let kind = scalar_kind(entity, field, f.scalar())?;
        let value = coerce(entity, field, kind, value.clone())?;

        if value.is_null() && !matches!(op, CompareOp::Eq | CompareOp::Ne) {
          return Err(Error::invalid_field(&entity.name, field, "only eq/ne compare against null"));
        }
        if op.is_ordering() && kind == ScalarKind::Boolean {
          return Err(Error::invalid_field(&entity.name, field, "booleans have no ordering"));
        }
        if op.is_textual() && !matches!(kind, ScalarKind::Text | ScalarKind::Id) {
          return Err(Error::invalid_field(
            &entity.name,
            field,
            format!("{op:?} applies to text fields only"),
          ));
        }

        if *op == CompareOp::Matches {
          if !config.enable_regex {
            return Err(Error::invalid_field(&entity.name, field, "regular expression filters are disabled"));
          }
          let pattern = value.as_str().unwrap_or_default();
          let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            Error::invalid_field(&entity.name, field, format!("invalid regular expression: {e}"))
          })?;
          Self::Matches { field: field.clone(), regex }
        } else {
          Self::Compare { field: field.clone(), op: *op, value, indexed: f.is_indexed() }
        }
      }
      Filter::In { field, values } => {
        let kind = scalar_kind(entity, field, entity.require_field(field)?.scalar())?;
        let values = values
          .iter()
          .map(|v| coerce(entity, field, kind, v.clone()))
          .collect::<Result<_>>()?;
        Self::In { field: field.clone(), values }
      }
      Filter::IsNull { field, is_null } => {
        scalar_kind(entity, field, entity.require_field(field)?.scalar())?;
        Self::IsNull { field: field.clone(), is_null: *is_null }
      }
      Filter::Relation { field, quantifier, filter } => {
        let rel = RelationRef::resolve(entity, field)?;
        let target = schema.require_entity(&rel.rel.target)?;
        let inner = filter
          .as_deref()
          .map(|f| Self::compile(schema, config, target, f).map(Box::new))
          .transpose()?;
        Self::Relation { rel, quantifier: *quantifier, inner }
      }
    })
  }

  /// An equality on an indexed field that every match must satisfy, usable
  /// to narrow candidates through the store index.
  pub(crate) fn index_hint(&self) -> Option<(&str, &Value)> {
    match self {
      Self::Compare { field, op: CompareOp::Eq, value, indexed: true } if !value.is_null() => {
        Some((field.as_str(), value))
      }
      Self::And(all) => all.iter().find_map(Self::index_hint),
      _ => None,
    }
  }

  pub(crate) fn eval<S: Snapshot + ?Sized>(
    &self,
    instance: &Instance,
    graph: &mut Traversal<'_, S>,
  ) -> Result<bool> {
    Ok(match self {
      Self::And(all) => {
        for p in all {
          if !p.eval(instance, graph)? {
            return Ok(false);
          }
        }
        true
      }
      Self::Or(any) => {
        for p in any {
          if p.eval(instance, graph)? {
            return Ok(true);
          }
        }
        false
      }
      Self::Not(inner) => !inner.eval(instance, graph)?,
      Self::Compare { field, op, value, .. } => compare(instance.get(field), *op, value),
      Self::Matches { field, regex } => instance.get(field).as_str().is_some_and(|s| regex.is_match(s)),
      Self::In { field, values } => values.contains(instance.get(field)),
      Self::IsNull { field, is_null } => instance.get(field).is_null() == *is_null,
      Self::Relation { rel, quantifier, inner } => {
        let related = graph.related(instance.id, rel)?;
        let mut matching = 0;
        for other in &related {
          let hit = match inner {
            Some(p) => p.eval(other, graph)?,
            None => true,
          };
          if hit {
            matching += 1;
          }
        }
        match quantifier {
          Quantifier::Some => matching > 0,
          Quantifier::None => matching == 0,
          Quantifier::All => matching == related.len(),
          Quantifier::Single => matching == 1,
        }
      }
    })
  }
}

fn scalar_kind(entity: &EntityType, field: &str, kind: Option<ScalarKind>) -> Result<ScalarKind> {
  kind.ok_or_else(|| {
    Error::invalid_field(&entity.name, field, "relationship fields need a relation filter")
  })
}

pub(crate) fn coerce(entity: &EntityType, field: &str, kind: ScalarKind, value: Value) -> Result<Value> {
  value
    .coerce(kind)
    .ok_or_else(|| Error::invalid_field(&entity.name, field, format!("expected a {kind} value")))
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
  use std::cmp::Ordering::*;

  match op {
    CompareOp::Eq => actual == expected,
    CompareOp::Ne => actual != expected,
    // Ordering and string operators never match a null field.
    _ if actual.is_null() => false,
    CompareOp::Lt => actual.compare(expected) == Less,
    CompareOp::Lte => actual.compare(expected) != Greater,
    CompareOp::Gt => actual.compare(expected) == Greater,
    CompareOp::Gte => actual.compare(expected) != Less,
    CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith => {
      match (actual.as_str(), expected.as_str()) {
        (Some(a), Some(e)) => match op {
          CompareOp::Contains => a.contains(e),
          CompareOp::StartsWith => a.starts_with(e),
          _ => a.ends_with(e),
        },
        _ => false,
      }
    }
    CompareOp::Matches => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn string_operators() {
    let title = Value::from("Launch day");
    assert!(compare(&title, CompareOp::StartsWith, &Value::from("Launch")));
    assert!(compare(&title, CompareOp::Contains, &Value::from("ch d")));
    assert!(compare(&title, CompareOp::EndsWith, &Value::from("day")));
    assert!(!compare(&Value::Null, CompareOp::Contains, &Value::from("x")));
  }

  #[test]
  fn ordering_skips_nulls() {
    assert!(compare(&Value::from("b"), CompareOp::Gt, &Value::from("a")));
    assert!(compare(&Value::from("a"), CompareOp::Lte, &Value::from("a")));
    assert!(!compare(&Value::Null, CompareOp::Lt, &Value::from("a")));
    assert!(compare(&Value::Null, CompareOp::Eq, &Value::Null));
  }

  #[test]
  fn compile_rejects_bad_filters() {
    let schema = Schema::from_toml_str(include_str!("../../../schema/content.toml")).unwrap();
    let post = schema.entity("Post").unwrap();
    let config = EngineConfig::default();
    let compile = |f: Filter| Predicate::compile(&schema, &config, post, &f);

    assert!(compile(Filter::eq("nope", "x")).is_err());
    assert!(compile(Filter::eq("Tags", "x")).is_err());
    assert!(compile(Filter::compare("deleted", CompareOp::Gt, true)).is_err());
    assert!(compile(Filter::compare("createdAt", CompareOp::Contains, "2024")).is_err());
    assert!(compile(Filter::eq("createdAt", "yesterday")).is_err());
    assert!(compile(Filter::compare("title", CompareOp::Matches, "(")).is_err());

    let no_regex = EngineConfig { enable_regex: false, ..EngineConfig::default() };
    let f = Filter::compare("title", CompareOp::Matches, "La.*");
    assert!(Predicate::compile(&schema, &no_regex, post, &f).is_err());

    assert!(compile(Filter::eq("createdAt", "2024-01-01T00:00:00Z")).is_ok());
    assert!(compile(Filter::relation("Tags", Quantifier::Some, Some(Filter::eq("text", "news")))).is_ok());
  }

  #[test]
  fn index_hint_found_under_and() {
    let schema = Schema::from_toml_str(include_str!("../../../schema/content.toml")).unwrap();
    let tag = schema.entity("Tag").unwrap();
    let config = EngineConfig::default();
    let f = Filter::eq("text", "news").and(Filter::is_null("text").not());
    let p = Predicate::compile(&schema, &config, tag, &f).unwrap();
    assert_eq!(p.index_hint(), Some(("text", &Value::from("news"))));

    let or = Filter::Or(vec![Filter::eq("text", "a"), Filter::eq("text", "b")]);
    let p = Predicate::compile(&schema, &config, tag, &or).unwrap();
    assert_eq!(p.index_hint(), None);
  }
}
