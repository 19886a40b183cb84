//! Error types for the SQLite store.

use keygate_license::LicenseError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection string could not be interpreted.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A stored value could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Connection mutex poisoned by a panicking holder.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl From<StoreError> for LicenseError {
    fn from(e: StoreError) -> Self {
        LicenseError::Store(e.to_string())
    }
}
