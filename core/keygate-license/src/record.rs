//! Persisted license records.
//!
//! A record is seeded out of band, mutated exactly once on its first
//! successful activation, and never deleted by the activation logic.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One row of the `licenses` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseRecord {
    /// Row identifier. The activation update is guarded on this, not the code.
    pub id: i64,
    /// Unique license code.
    pub code: String,
    /// Whether the code has been activated.
    pub is_used: bool,
    /// Machine the code is bound to, once used.
    pub machine_id: Option<String>,
    /// When the code was first activated.
    pub activated_at: Option<DateTime<Utc>>,
    /// When the record was seeded.
    pub created_at: DateTime<Utc>,
    /// Whether the code grants time-limited access.
    pub is_trial: bool,
    /// End of the trial window, for activated trial codes.
    pub trial_expires_at: Option<DateTime<Utc>>,
}

impl LicenseRecord {
    /// Returns true if the record is bound to `machine_id`.
    #[must_use]
    pub fn is_bound_to(&self, machine_id: &str) -> bool {
        self.machine_id.as_deref() == Some(machine_id)
    }

    /// Applies an activation to an unused record.
    pub fn apply(&mut self, activation: &Activation) {
        self.is_used = true;
        self.machine_id = Some(activation.machine_id.clone());
        self.activated_at = Some(activation.activated_at);
        self.is_trial = activation.is_trial;
        self.trial_expires_at = activation.trial_expires_at;
    }
}

/// The field set written by a first activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activation {
    pub machine_id: String,
    pub activated_at: DateTime<Utc>,
    pub is_trial: bool,
    pub trial_expires_at: Option<DateTime<Utc>>,
}

/// A code to seed into the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLicense {
    pub code: String,
    /// Trial tag decided at issuance.
    pub is_trial: bool,
}

impl NewLicense {
    /// A permanent (non-trial) code.
    #[must_use]
    pub fn permanent(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_trial: false,
        }
    }

    /// A trial code.
    #[must_use]
    pub fn trial(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_trial: true,
        }
    }
}

/// Formats a timestamp the way responses and signatures carry it:
/// ISO-8601 UTC, millisecond precision, `Z` suffix.
#[must_use]
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}
