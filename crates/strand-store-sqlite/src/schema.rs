//! SQL schema for the Strand SQLite store.
//!
//! Executed once at connection startup. Constraint indexes are created
//! later, per provisioned constraint, by
//! [`SqliteStore`](crate::SqliteStore).

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Scanned in rowid order, which is creation order.
CREATE TABLE IF NOT EXISTS instances (
    instance_id TEXT PRIMARY KEY,
    entity      TEXT NOT NULL,
    fields_json TEXT NOT NULL,   -- scalar values, tagged by kind
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS edges (
    label         TEXT NOT NULL,
    source_id     TEXT NOT NULL REFERENCES instances(instance_id),
    source_entity TEXT NOT NULL,
    target_id     TEXT NOT NULL REFERENCES instances(instance_id),
    target_entity TEXT NOT NULL,
    PRIMARY KEY (label, source_id, target_id)
);

-- One row per instance per provisioned field; nulls are never indexed.
CREATE TABLE IF NOT EXISTS field_index (
    entity      TEXT NOT NULL,
    field       TEXT NOT NULL,
    value       TEXT NOT NULL,
    instance_id TEXT NOT NULL REFERENCES instances(instance_id),
    PRIMARY KEY (entity, field, instance_id)
);

CREATE TABLE IF NOT EXISTS constraints (
    name       TEXT PRIMARY KEY,
    kind       TEXT NOT NULL,    -- 'unique' | 'index'
    entity     TEXT NOT NULL,
    field      TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS instances_entity_idx    ON instances(entity);
CREATE INDEX IF NOT EXISTS edges_target_idx        ON edges(label, target_id);
CREATE INDEX IF NOT EXISTS edges_source_any_idx    ON edges(source_id);
CREATE INDEX IF NOT EXISTS edges_target_any_idx    ON edges(target_id);
CREATE INDEX IF NOT EXISTS field_index_instance_idx ON field_index(instance_id);

PRAGMA user_version = 1;
";

/// Quote `s` as an SQL string literal.
pub fn literal(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }

/// Quote `s` as an SQL identifier.
pub fn ident(s: &str) -> String { format!("\"{}\"", s.replace('"', "\"\"")) }

/// DDL for the partial index backing one constraint.
pub fn constraint_index(name: &str, unique: bool, entity: &str, field: &str) -> String {
  format!(
    "CREATE {}INDEX IF NOT EXISTS {} ON field_index(value) WHERE entity = {} AND field = {}",
    if unique { "UNIQUE " } else { "" },
    ident(name),
    literal(entity),
    literal(field),
  )
}
