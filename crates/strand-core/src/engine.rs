//! The engine facade: startup, operation dispatch and shutdown.

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
  EngineConfig, Result,
  error::ErrorKind,
  mutate,
  operation::{Mutation, Operation, Query},
  plan,
  provision::{self, ProvisionReport},
  record::{MutationResult, Outcome, QueryResult},
  resolve,
  schema::Schema,
  store::{GraphStore, Snapshot, WriteTxn},
};

/// A provisioned engine over a store handle. Cheap to clone; clones share
/// the schema.
#[derive(Debug, Clone)]
pub struct Engine<S> {
  schema: Arc<Schema>,
  store:  S,
  config: EngineConfig,
}

impl<S: GraphStore> Engine<S> {
  /// Provision constraints for `schema`, then return a handle ready to
  /// serve operations. A provisioning failure is returned as-is and should
  /// abort startup.
  pub async fn start(schema: Schema, store: S, config: EngineConfig) -> Result<Self> {
    let report = provision::provision(&store, &schema).await?;
    log_report(&report);
    Ok(Self { schema: Arc::new(schema), store, config })
  }

  pub fn schema(&self) -> &Schema { &self.schema }

  pub fn store(&self) -> &S { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  pub async fn query(&self, query: &Query) -> Result<QueryResult> {
    let plan = plan::query(&self.schema, &self.config, query)?;
    debug!(entity = %query.entity, "query");

    let result = self
      .store
      .execute_read(Box::new(move |snapshot: &dyn Snapshot| resolve::run(snapshot, &plan)))
      .await?;
    debug!(entity = %query.entity, total = result.total_count, "query resolved");
    Ok(result)
  }

  pub async fn mutate(&self, mutation: &Mutation) -> Result<MutationResult> {
    let plan = plan::mutation(&self.schema, &self.config, mutation)?;
    let schema = Arc::clone(&self.schema);
    debug!(entity = %mutation.entity(), "mutation");

    let result = self
      .store
      .execute_write(Box::new(move |txn: &mut dyn WriteTxn| mutate::apply(&schema, txn, &plan)))
      .await;

    match &result {
      Ok(r) => {
        debug!(entity = %mutation.entity(), count = r.count, info = ?r.info, "mutation committed");
      }
      Err(e) if e.kind() == ErrorKind::ConstraintViolation => {
        debug!(entity = %mutation.entity(), error = %e, "mutation rejected");
      }
      Err(_) => {}
    }
    result
  }

  pub async fn execute(&self, operation: &Operation) -> Result<Outcome> {
    match operation {
      Operation::Query(q) => self.query(q).await.map(Outcome::Query),
      Operation::Mutation(m) => self.mutate(m).await.map(Outcome::Mutation),
    }
  }

  /// Release the store handle.
  pub async fn shutdown(self) -> Result<()> {
    info!("shutting down");
    self.store.close().await
  }
}

fn log_report(report: &ProvisionReport) {
  info!(
    created = report.created.len(),
    existing = report.existing.len(),
    "constraints provisioned"
  );
}
