//! Outcomes of the activation decision table.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The outcome of one activation or verification request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Verdict {
    /// No record matches the code.
    InvalidCode,
    /// The code is bound to a different machine.
    BoundToOtherDevice,
    /// Trial code bound to this machine, past its expiry.
    TrialExpired { expires_at: Option<DateTime<Utc>> },
    /// Trial code bound to this machine, still within its window.
    TrialActive {
        expires_at: DateTime<Utc>,
        /// Time left until expiry.
        #[serde(with = "remaining_secs")]
        remaining: Duration,
    },
    /// Permanent code bound to this machine.
    Verified,
    /// First activation, just bound to this machine.
    Activated {
        is_trial: bool,
        expires_at: Option<DateTime<Utc>>,
    },
}

impl Verdict {
    /// Returns true if the client should be granted access.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Verified | Self::Activated { .. } | Self::TrialActive { .. }
        )
    }

    /// HTTP status code for this verdict.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidCode => 404,
            Self::BoundToOtherDevice => 403,
            Self::TrialExpired { .. } => 402,
            Self::TrialActive { .. } | Self::Verified | Self::Activated { .. } => 200,
        }
    }

    /// Whether the response should flag the license as a trial.
    #[must_use]
    pub fn is_trial(&self) -> bool {
        match self {
            Self::TrialExpired { .. } | Self::TrialActive { .. } => true,
            Self::Activated { is_trial, .. } => *is_trial,
            Self::InvalidCode | Self::BoundToOtherDevice | Self::Verified => false,
        }
    }

    /// Trial expiry to report, if any.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::TrialExpired { expires_at } | Self::Activated { expires_at, .. } => *expires_at,
            Self::TrialActive { expires_at, .. } => Some(*expires_at),
            Self::InvalidCode | Self::BoundToOtherDevice | Self::Verified => None,
        }
    }

    /// Human-readable message for the response body.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::InvalidCode => "Invalid license code".to_string(),
            Self::BoundToOtherDevice => {
                "License code is already activated on another device".to_string()
            }
            Self::TrialExpired { .. } => "Trial license has expired".to_string(),
            Self::TrialActive { remaining, .. } if *remaining < Duration::minutes(1) => {
                "Trial active: less than 1 minute remaining".to_string()
            }
            Self::TrialActive { remaining, .. } => format!(
                "Trial active: {} minute(s) remaining",
                minutes_rounded_up(*remaining)
            ),
            Self::Verified => "License verified".to_string(),
            Self::Activated { is_trial: true, .. } => "Trial license activated".to_string(),
            Self::Activated { is_trial: false, .. } => "License activated".to_string(),
        }
    }

    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::BoundToOtherDevice => "bound_to_other_device",
            Self::TrialExpired { .. } => "trial_expired",
            Self::TrialActive { .. } => "trial_active",
            Self::Verified => "verified",
            Self::Activated { .. } => "activated",
        }
    }
}

fn minutes_rounded_up(remaining: Duration) -> i64 {
    let secs = remaining.num_seconds().max(0);
    (secs + 59) / 60
}

mod remaining_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        i64::deserialize(d).map(Duration::seconds)
    }
}
