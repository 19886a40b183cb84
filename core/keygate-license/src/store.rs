//! Storage seam for license records.

use crate::error::{LicenseError, LicenseResult};
use crate::record::{Activation, LicenseRecord, NewLicense};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Persistent store of license records.
///
/// Implementations must make [`LicenseStore::try_activate`] an atomic
/// compare-and-swap on the unused predicate: of any number of concurrent
/// calls for the same unused row, exactly one returns `true`.
pub trait LicenseStore: Send + Sync {
    /// Looks up the record for a code.
    fn find_by_code(&self, code: &str) -> LicenseResult<Option<LicenseRecord>>;

    /// Marks row `id` as activated if and only if it is still unused.
    ///
    /// Returns `false` when the row was already used (or does not exist).
    fn try_activate(&self, id: i64, activation: &Activation) -> LicenseResult<bool>;
}

/// In-memory store guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    by_code: HashMap<String, LicenseRecord>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a new unused record.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Store`] if the code already exists.
    pub fn insert(&self, license: NewLicense) -> LicenseResult<LicenseRecord> {
        let mut inner = self.lock()?;
        if inner.by_code.contains_key(&license.code) {
            return Err(LicenseError::Store(format!(
                "license code already exists: {}",
                license.code
            )));
        }
        inner.next_id += 1;
        let record = LicenseRecord {
            id: inner.next_id,
            code: license.code.clone(),
            is_used: false,
            machine_id: None,
            activated_at: None,
            created_at: Utc::now(),
            is_trial: license.is_trial,
            trial_expires_at: None,
        };
        inner.by_code.insert(license.code, record.clone());
        Ok(record)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.by_code.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> LicenseResult<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| LicenseError::Store("memory store lock poisoned".to_string()))
    }
}

impl LicenseStore for MemoryStore {
    fn find_by_code(&self, code: &str) -> LicenseResult<Option<LicenseRecord>> {
        Ok(self.lock()?.by_code.get(code).cloned())
    }

    fn try_activate(&self, id: i64, activation: &Activation) -> LicenseResult<bool> {
        let mut inner = self.lock()?;
        let Some(record) = inner
            .by_code
            .values_mut()
            .find(|r| r.id == id && !r.is_used)
        else {
            return Ok(false);
        };
        record.apply(activation);
        Ok(true)
    }
}
