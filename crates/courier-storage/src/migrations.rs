//! Versioned schema for the durable store.
//!
//! Each entry in [`MIGRATIONS`] is applied at most once, in order, inside its
//! own transaction. `schema_migrations` records what has run.

use rusqlite::Connection;
use tracing::info;

use courier_core::error::CourierError;

/// A named schema step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_store",
    sql: "CREATE TABLE kv_store (
              key         TEXT PRIMARY KEY NOT NULL,
              value       TEXT NOT NULL,
              updated_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
          );",
}];

fn storage_err(context: &str) -> impl Fn(rusqlite::Error) -> CourierError + '_ {
    move |e| CourierError::Storage(format!("{}: {}", context, e))
}

/// Highest migration version recorded in the database.
pub fn schema_version(conn: &Connection) -> Result<i64, CourierError> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(storage_err("Failed to read schema version"))
}

/// Bring the schema up to the latest version.
pub fn run_migrations(conn: &Connection) -> Result<(), CourierError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(storage_err("Failed to create schema_migrations"))?;

    let current = schema_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn
            .unchecked_transaction()
            .map_err(storage_err("Failed to begin migration"))?;
        tx.execute_batch(migration.sql)
            .map_err(storage_err(migration.name))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(storage_err("Failed to record migration"))?;
        tx.commit().map_err(storage_err("Failed to commit migration"))?;
        info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}
