//! The activation decision engine.
//!
//! Applies the decision table to the record for a code:
//!
//! 1. no record                                  → `InvalidCode`
//! 2. used, other machine                        → `BoundToOtherDevice`
//! 3. used, same machine, trial, past expiry     → `TrialExpired`
//! 4. used, same machine, trial, before expiry   → `TrialActive`
//! 5. used, same machine, permanent              → `Verified`
//! 6. unused                                     → first activation → `Activated`
//!
//! Path 6 is the only write. It goes through [`LicenseStore::try_activate`];
//! losing that compare-and-swap means another request activated the code
//! first, so the record is re-read and resolved through paths 2–5.

use crate::error::{LicenseError, LicenseResult};
use crate::record::{Activation, LicenseRecord};
use crate::response::{ActivationRequest, SignedResponse};
use crate::signing::ResponseSigner;
use crate::store::LicenseStore;
use crate::verdict::Verdict;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Default trial length.
pub const DEFAULT_TRIAL_MINUTES: i64 = 10;

/// Longest accepted trial, one hundred years.
pub const MAX_TRIAL_MINUTES: i64 = 525_600 * 100;

/// Default code prefix marking trial codes.
pub const DEFAULT_TRIAL_PREFIX: &str = "TRIAL-";

/// How trial codes are recognised and how long they last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialPolicy {
    /// Length of the trial window from first activation.
    pub duration: Duration,
    /// Case-sensitive code prefix that marks a trial, in addition to the
    /// issuance-time flag. `None` trusts the flag alone.
    pub code_prefix: Option<String>,
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            duration: Duration::minutes(DEFAULT_TRIAL_MINUTES),
            code_prefix: Some(DEFAULT_TRIAL_PREFIX.to_string()),
        }
    }
}

impl TrialPolicy {
    /// Builds a policy from minutes and an optional prefix; an empty prefix
    /// disables prefix matching.
    #[must_use]
    pub fn new(minutes: i64, code_prefix: Option<&str>) -> Self {
        Self {
            duration: Duration::try_minutes(minutes).unwrap_or(Duration::MAX),
            code_prefix: code_prefix
                .filter(|p| !p.is_empty())
                .map(ToString::to_string),
        }
    }

    /// Returns true if the record should activate as a trial.
    #[must_use]
    pub fn is_trial(&self, record: &LicenseRecord) -> bool {
        record.is_trial
            || self
                .code_prefix
                .as_deref()
                .is_some_and(|prefix| record.code.starts_with(prefix))
    }
}

/// Decides activation requests against a store and signs the result.
#[derive(Clone)]
pub struct ActivationEngine {
    store: Arc<dyn LicenseStore>,
    signer: ResponseSigner,
    trial: TrialPolicy,
}

impl std::fmt::Debug for ActivationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationEngine")
            .field("signer", &self.signer)
            .field("trial", &self.trial)
            .finish_non_exhaustive()
    }
}

impl ActivationEngine {
    #[must_use]
    pub fn new(store: Arc<dyn LicenseStore>, signer: ResponseSigner, trial: TrialPolicy) -> Self {
        Self {
            store,
            signer,
            trial,
        }
    }

    #[must_use]
    pub fn signer(&self) -> &ResponseSigner {
        &self.signer
    }

    #[must_use]
    pub fn trial_policy(&self) -> &TrialPolicy {
        &self.trial
    }

    /// Handles a request at the current wall-clock time.
    #[must_use]
    pub fn handle(&self, request: &ActivationRequest) -> SignedResponse {
        self.handle_at(request, Utc::now())
    }

    /// Handles a request as of `now`, producing a signed response for every
    /// outcome.
    #[must_use]
    pub fn handle_at(&self, request: &ActivationRequest, now: DateTime<Utc>) -> SignedResponse {
        let (code, machine_id) = match request.validate() {
            Ok(fields) => fields,
            Err(e) => {
                debug!(error = %e, "rejecting activation request");
                return SignedResponse::from_error(&e, request.machine_id(), &self.signer);
            }
        };

        match self.decide(code, machine_id, now) {
            Ok(verdict) => {
                if matches!(verdict, Verdict::Activated { .. }) {
                    info!(code, machine_id, is_trial = verdict.is_trial(), "license activated");
                } else {
                    debug!(code, machine_id, verdict = verdict.name(), "license checked");
                }
                SignedResponse::from_verdict(&verdict, machine_id, &self.signer)
            }
            Err(e) => {
                error!(code, machine_id, error = %e, "activation failed");
                SignedResponse::from_error(&e, Some(machine_id), &self.signer)
            }
        }
    }

    /// Runs the decision table for `code` and `machine_id` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Store`] on store failures, or if a lost
    /// activation race leaves the record unused on re-read, and
    /// [`LicenseError::Configuration`] if the trial window cannot be added
    /// to `now`.
    pub fn decide(&self, code: &str, machine_id: &str, now: DateTime<Utc>) -> LicenseResult<Verdict> {
        let Some(record) = self.store.find_by_code(code)? else {
            return Ok(Verdict::InvalidCode);
        };

        if record.is_used {
            return Ok(self.resolve_used(&record, machine_id, now));
        }

        let is_trial = self.trial.is_trial(&record);
        let trial_expires_at = if is_trial {
            let expires_at = now.checked_add_signed(self.trial.duration).ok_or_else(|| {
                LicenseError::Configuration(format!(
                    "trial duration of {} minutes overflows the expiry timestamp",
                    self.trial.duration.num_minutes()
                ))
            })?;
            Some(expires_at)
        } else {
            None
        };
        let activation = Activation {
            machine_id: machine_id.to_string(),
            activated_at: now,
            is_trial,
            trial_expires_at,
        };

        if self.store.try_activate(record.id, &activation)? {
            return Ok(Verdict::Activated {
                is_trial,
                expires_at: activation.trial_expires_at,
            });
        }

        debug!(code, machine_id, "lost activation race, re-reading record");
        match self.store.find_by_code(code)? {
            Some(current) if current.is_used => Ok(self.resolve_used(&current, machine_id, now)),
            Some(_) => Err(LicenseError::Store(format!(
                "activation of {code} did not apply and the record is still unused"
            ))),
            None => Ok(Verdict::InvalidCode),
        }
    }

    fn resolve_used(&self, record: &LicenseRecord, machine_id: &str, now: DateTime<Utc>) -> Verdict {
        if !record.is_bound_to(machine_id) {
            return Verdict::BoundToOtherDevice;
        }
        if !record.is_trial {
            return Verdict::Verified;
        }
        match record.trial_expires_at {
            Some(expires_at) if now <= expires_at => Verdict::TrialActive {
                expires_at,
                remaining: expires_at - now,
            },
            expires_at => Verdict::TrialExpired { expires_at },
        }
    }
}
