//! `strand` operator binary.
//!
//! Reads `strand.toml` (or the path given with `--config`) and loads the
//! schema. Commands that touch data open the SQLite store and provision it
//! first.
//!
//! ```
//! strand check
//! strand provision
//! echo '{"query": {"entity": "Tag"}}' | strand exec -
//! ```

use std::{
  io::Read as _,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use strand_core::{
  Engine, EngineConfig, Schema,
  operation::Operation,
  provision::{derive_constraints, provision},
};
use strand_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "strand", version, about = "Schema-driven graph query and mutation engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "strand.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Load the schema and print a summary of it.
  Check,
  /// Provision store constraints for the schema and exit.
  Provision,
  /// Run a JSON operation (or array of operations) and print the results.
  Exec {
    /// File holding the operations, or `-` for stdin.
    #[arg(value_name = "FILE")]
    input: String,
  },
}

// ─── Config ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct ServiceConfig {
  store_path:  PathBuf,
  schema_path: PathBuf,
  #[serde(default)]
  engine:      EngineConfig,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
  Many(Vec<Operation>),
  One(Operation),
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let service = load_config(&cli.config)?;

  let schema_path = expand_tilde(&service.schema_path);
  let schema = Schema::load(&schema_path)
    .with_context(|| format!("failed to load schema from {schema_path:?}"))?;

  match cli.command {
    Command::Check => print_summary(&schema),
    Command::Provision => {
      let store = open_store(&service.store_path).await?;
      let report = provision(&store, &schema).await.context("provisioning failed")?;
      println!("created:  {}", report.created.join(", "));
      println!("existing: {}", report.existing.join(", "));
    }
    Command::Exec { input } => {
      let batch = read_batch(&input)?;
      tracing::info!(operations = batch.len(), "executing batch");
      let store = open_store(&service.store_path).await?;
      let engine = Engine::start(schema, store, service.engine)
        .await
        .context("engine startup failed")?;

      let mut outcomes = Vec::new();
      for operation in batch {
        let outcome = engine.execute(&operation).await.context("operation failed")?;
        outcomes.push(outcome);
      }
      println!("{}", serde_json::to_string_pretty(&outcomes)?);

      engine.shutdown().await.context("failed to close store")?;
    }
  }

  Ok(())
}

/// File settings overlaid with `STRAND_*` variables; `__` separates
/// nested keys, as in `STRAND_ENGINE__MAX_DEPTH`.
fn load_config(path: &Path) -> anyhow::Result<ServiceConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("STRAND")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;
  settings
    .try_deserialize()
    .context("failed to deserialise ServiceConfig")
}

fn print_summary(schema: &Schema) {
  for entity in schema.entities() {
    let (relationships, scalars): (Vec<_>, Vec<_>) =
      entity.fields().partition(|f| f.relationship().is_some());
    println!(
      "{}: {} scalar fields, {} relationships",
      entity.name,
      scalars.len(),
      relationships.len()
    );
  }
  for edge in schema.edges() {
    println!(
      "({})-[{}]->({})  {} / {}",
      edge.source, edge.label, edge.target, edge.out_field, edge.in_field
    );
  }
  for spec in derive_constraints(schema) {
    println!("constraint {}", spec.name());
  }
}

async fn open_store(path: &Path) -> anyhow::Result<SqliteStore> {
  let path = expand_tilde(path);
  SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}

/// Parse one operation or an array of them from a file or stdin.
fn read_batch(input: &str) -> anyhow::Result<Vec<Operation>> {
  let raw = if input == "-" {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
    buf
  } else {
    std::fs::read_to_string(input).with_context(|| format!("failed to read {input}"))?
  };

  let batch: Batch = serde_json::from_str(&raw).context("failed to parse operations")?;
  Ok(match batch {
    Batch::Many(ops) => ops,
    Batch::One(op) => vec![op],
  })
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
