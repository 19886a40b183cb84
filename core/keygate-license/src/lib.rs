//! License activation and verification for Keygate.
//!
//! This crate handles:
//! - The activation decision table (unknown, bound elsewhere, trial, verified, first activation)
//! - First-time activation through an atomic compare-and-swap on the store
//! - Ed25519 signing of every response, accepted or rejected
//! - Verification of signed responses for clients holding the public key
//!
//! # Design Principles
//!
//! - **One row per request**: one read, at most one conditional write
//! - **Permanent binding**: once a code is bound to a machine it stays bound
//! - **Audit trail**: expired trials are rejected but never mutated or deleted
//! - **Unforgeable answers**: rejections are signed exactly like acceptances
//!
//! # Signed Payload
//!
//! Signatures cover the compact JSON encoding of
//! `{"success","message","machineId","isTrial","expiryDate"}` in that order.

mod engine;
mod error;
mod record;
mod response;
mod signing;
mod store;
mod verdict;

pub use engine::{
    ActivationEngine, TrialPolicy, DEFAULT_TRIAL_MINUTES, DEFAULT_TRIAL_PREFIX, MAX_TRIAL_MINUTES,
};
pub use error::{LicenseError, LicenseResult};
pub use record::{format_timestamp, Activation, LicenseRecord, NewLicense};
pub use response::{ActivationRequest, ActivationResponse, SignedResponse};
pub use signing::{ResponseSigner, ResponseVerifier, SignedPayload};
pub use store::{LicenseStore, MemoryStore};
pub use verdict::Verdict;
