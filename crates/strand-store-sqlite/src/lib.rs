//! SQLite backend for the Strand graph store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Instances live in an arena
//! table, edges in an adjacency table keyed by label, and provisioned
//! field values in `field_index` behind partial indexes.

mod encode;
mod schema;
mod store;
mod txn;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
