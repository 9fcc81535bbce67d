//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::{DatabaseError, DatabaseResult};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version > CURRENT_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current_version, CURRENT_VERSION
        )));
    }

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_location_fix_outbox(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Outbox of location fixes awaiting delivery.
fn migrate_v1_location_fix_outbox(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: location fix outbox");

    // AUTOINCREMENT keeps ids monotonic even after the newest row is deleted.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS location_fix_outbox (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id TEXT NOT NULL,
            captured_at_ms INTEGER NOT NULL,
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            accuracy REAL NOT NULL,
            battery REAL NOT NULL,
            charging INTEGER NOT NULL DEFAULT 0,
            mock INTEGER NOT NULL DEFAULT 0,
            queued_at_ms INTEGER NOT NULL
        );
        ",
    )?;

    record_migration(conn, 1, "location_fix_outbox")?;
    Ok(())
}
