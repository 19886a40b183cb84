//! SQLite-backed [`LicenseStore`].

use crate::error::{StoreError, StoreResult};
use crate::migrations;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use keygate_license::{Activation, LicenseRecord, LicenseResult, LicenseStore, NewLicense};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_COLUMNS: &str = "id, code, is_used, machine_id, activated_at, created_at, \
                              is_trial, trial_expires_at";

/// License store over a single SQLite connection.
///
/// The connection is owned here and shared behind a mutex; open it once at
/// startup, run [`SqliteStore::migrate`], and [`SqliteStore::close`] it on
/// shutdown.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens a store from a connection string: a file path, `sqlite://path`,
    /// `sqlite:path`, or `:memory:`.
    pub fn open(connection_string: &str) -> StoreResult<Self> {
        let target = parse_connection_string(connection_string)?;
        let conn = if target == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(Path::new(target))?
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!(database = target, "license store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    /// Creates or upgrades the schema. Idempotent.
    pub fn migrate(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        migrations::migrate(&conn)
    }

    /// Seeds a new unused license code.
    pub fn insert(&self, license: &NewLicense) -> StoreResult<LicenseRecord> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO licenses (code, is_trial, created_at) VALUES (?1, ?2, ?3)",
            params![license.code, license.is_trial, encode_timestamp(&Utc::now())],
        )?;
        let id = conn.last_insert_rowid();
        query_by_id(&conn, id)?
            .ok_or_else(|| StoreError::InvalidData(format!("inserted row {id} not found")))
    }

    /// Looks up the record for a code.
    pub fn get(&self, code: &str) -> StoreResult<Option<LicenseRecord>> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM licenses WHERE code = ?1"),
            params![code],
            RawRecord::from_row,
        )
        .optional()?
        .map(RawRecord::decode)
        .transpose()
    }

    /// Marks row `id` activated if it is still unused, in one statement.
    pub fn activate_if_unused(&self, id: i64, activation: &Activation) -> StoreResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE licenses
             SET is_used = 1, machine_id = ?2, activated_at = ?3, is_trial = ?4, trial_expires_at = ?5
             WHERE id = ?1 AND is_used = 0",
            params![
                id,
                activation.machine_id,
                encode_timestamp(&activation.activated_at),
                activation.is_trial,
                activation.trial_expires_at.as_ref().map(encode_timestamp),
            ],
        )?;
        debug!(id, changed, "conditional activation update");
        Ok(changed == 1)
    }

    /// Number of seeded codes.
    pub fn count(&self) -> StoreResult<i64> {
        let conn = self.lock()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM licenses", [], |row| row.get(0))?)
    }

    /// Closes the underlying connection.
    pub fn close(self) -> StoreResult<()> {
        let conn = self.conn.into_inner().map_err(|_| StoreError::LockPoisoned)?;
        conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        info!("license store closed");
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl LicenseStore for SqliteStore {
    fn find_by_code(&self, code: &str) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.get(code)?)
    }

    fn try_activate(&self, id: i64, activation: &Activation) -> LicenseResult<bool> {
        Ok(self.activate_if_unused(id, activation)?)
    }
}

fn parse_connection_string(s: &str) -> StoreResult<&str> {
    let s = s.trim();
    let target = s
        .strip_prefix("sqlite://")
        .or_else(|| s.strip_prefix("sqlite:"))
        .unwrap_or(s);
    if target.is_empty() {
        return Err(StoreError::InvalidConnectionString(
            "database path is empty".to_string(),
        ));
    }
    if target.contains("://") {
        return Err(StoreError::InvalidConnectionString(format!(
            "unsupported scheme in {s}"
        )));
    }
    Ok(target)
}

fn query_by_id(conn: &Connection, id: i64) -> StoreResult<Option<LicenseRecord>> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM licenses WHERE id = ?1"),
        params![id],
        RawRecord::from_row,
    )
    .optional()?
    .map(RawRecord::decode)
    .transpose()
}

/// A row as SQLite returns it, timestamps still text.
struct RawRecord {
    id: i64,
    code: String,
    is_used: bool,
    machine_id: Option<String>,
    activated_at: Option<String>,
    created_at: String,
    is_trial: bool,
    trial_expires_at: Option<String>,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            code: row.get(1)?,
            is_used: row.get(2)?,
            machine_id: row.get(3)?,
            activated_at: row.get(4)?,
            created_at: row.get(5)?,
            is_trial: row.get(6)?,
            trial_expires_at: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<LicenseRecord> {
        Ok(LicenseRecord {
            id: self.id,
            code: self.code,
            is_used: self.is_used,
            machine_id: self.machine_id,
            activated_at: self.activated_at.as_deref().map(decode_timestamp).transpose()?,
            created_at: decode_timestamp(&self.created_at)?,
            is_trial: self.is_trial,
            trial_expires_at: self
                .trial_expires_at
                .as_deref()
                .map(decode_timestamp)
                .transpose()?,
        })
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Accepts RFC 3339 and SQLite's `CURRENT_TIMESTAMP` format (UTC).
fn decode_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| StoreError::InvalidData(format!("invalid timestamp {s:?}: {e}")))
}
