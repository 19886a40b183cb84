//! Schema creation and in-place upgrades for the `licenses` table.
//!
//! Run once at startup, never per request. Every step is idempotent.

use crate::error::{StoreError, StoreResult};
use rusqlite::Connection;
use tracing::info;

/// Schema version recorded in `PRAGMA user_version` after migration.
pub const SCHEMA_VERSION: i64 = 2;

/// Creates the table if absent and adds columns missing from older schemas.
pub fn migrate(conn: &Connection) -> StoreResult<()> {
    let before: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if before > SCHEMA_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {before} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    conn.execute(
        "CREATE TABLE IF NOT EXISTS licenses (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            code TEXT NOT NULL UNIQUE,
            is_used INTEGER NOT NULL DEFAULT 0,
            machine_id TEXT,
            activated_at TEXT,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )",
        [],
    )?;
    ensure_trial_columns(conn)?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_licenses_code ON licenses(code)",
        [],
    )?;
    conn.execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))?;

    if before != SCHEMA_VERSION {
        info!(from = before, to = SCHEMA_VERSION, "licenses schema migrated");
    }
    Ok(())
}

/// Adds the trial columns to tables created before trials existed.
fn ensure_trial_columns(conn: &Connection) -> StoreResult<()> {
    let mut has_is_trial = false;
    let mut has_trial_expires_at = false;
    let mut stmt = conn.prepare("PRAGMA table_info('licenses')")?;
    let columns = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for column in columns {
        match column?.as_str() {
            "is_trial" => has_is_trial = true,
            "trial_expires_at" => has_trial_expires_at = true,
            _ => {}
        }
    }

    if !has_is_trial {
        conn.execute(
            "ALTER TABLE licenses ADD COLUMN is_trial INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !has_trial_expires_at {
        conn.execute("ALTER TABLE licenses ADD COLUMN trial_expires_at TEXT", [])?;
    }
    Ok(())
}
