//! Structured operations accepted by the engine.
//!
//! A gateway parses client syntax into these types; the engine never sees
//! raw request text. Everything here is plain data and serialisable, so an
//! operation can also travel as JSON.

mod filter;
mod mutation;
mod query;

use serde::{Deserialize, Serialize};

pub use filter::{CompareOp, Filter, Quantifier};
pub use mutation::{ConnectMode, CreateInput, Mutation, RelationOp, UpdateInput};
pub use query::{Page, Query, RelationQuery, Selection, Sort, SortDirection};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
  Query(Query),
  Mutation(Mutation),
}
