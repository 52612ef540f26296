//! Constraint provisioning: derive store constraints from the schema and
//! apply them once, before any operation is served.

use tracing::{debug, info};

use crate::{
  Error, Result,
  schema::Schema,
  store::{ConstraintKind, ConstraintOutcome, ConstraintSpec, GraphStore},
};

/// What a provisioning run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
  pub created:  Vec<String>,
  pub existing: Vec<String>,
}

/// The minimal constraint set for `schema`: one unique constraint per
/// `unique` field and one lookup index per `generated-identifier` field that
/// is not also unique.
pub fn derive_constraints(schema: &Schema) -> Vec<ConstraintSpec> {
  schema
    .entities()
    .flat_map(|entity| {
      entity.fields().filter(|f| f.is_indexed()).map(|f| ConstraintSpec {
        entity: entity.name.clone(),
        field:  f.name.clone(),
        kind:   if f.is_unique() { ConstraintKind::Unique } else { ConstraintKind::Index },
      })
    })
    .collect()
}

/// Apply every derived constraint. Idempotent; any failure is fatal.
pub async fn provision<S: GraphStore>(store: &S, schema: &Schema) -> Result<ProvisionReport> {
  let mut report = ProvisionReport::default();

  for spec in derive_constraints(schema) {
    let name = spec.name();
    let outcome = store.define_constraint(spec).await.map_err(|e| Error::Provisioning {
      constraint: name.clone(),
      detail:     e.to_string(),
    })?;

    match outcome {
      ConstraintOutcome::Created => {
        info!(constraint = %name, "constraint created");
        report.created.push(name);
      }
      ConstraintOutcome::AlreadyExists => {
        debug!(constraint = %name, "constraint already present");
        report.existing.push(name);
      }
      ConstraintOutcome::Failed { detail } => {
        return Err(Error::Provisioning { constraint: name, detail });
      }
    }
  }

  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_schema_constraints() {
    let schema = Schema::from_toml_str(include_str!("../../../schema/content.toml")).unwrap();
    let names: Vec<_> = derive_constraints(&schema).iter().map(ConstraintSpec::name).collect();
    assert_eq!(names, [
      "ix_Post_id",
      "uq_User_username",
      "ix_CommentSection_id",
      "ix_Comment_id",
      "uq_Tag_text",
    ]);
  }
}
