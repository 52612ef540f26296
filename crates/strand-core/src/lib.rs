//! Core model and engine for the Strand graph store.
//!
//! No database or process dependencies live here. Backends implement
//! [`store::GraphStore`]; the [`engine::Engine`] drives provisioning,
//! traversal queries and mutations on top of it.

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod instance;
pub mod operation;
pub mod provision;
pub mod record;
pub mod schema;
pub mod store;
pub mod value;

mod mutate;
mod plan;
mod predicate;
mod resolve;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, ErrorKind, Result};
pub use instance::{Edge, Instance, InstanceId};
pub use schema::Schema;
pub use value::Value;
