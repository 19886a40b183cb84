//! Shared test helpers for license tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use keygate_license::{
    ActivationEngine, LicenseStore, MemoryStore, NewLicense, ResponseSigner, ResponseVerifier,
    TrialPolicy,
};
use std::sync::Arc;

/// Fixed seed for a deterministic Ed25519 key pair.
pub const TEST_SEED: [u8; 32] = [
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26,
    27, 28, 29, 30, 31, 32,
];

/// Returns a signer and the verifier for its public key.
pub fn test_signer() -> (ResponseSigner, ResponseVerifier) {
    let signer = ResponseSigner::from_seed(&TEST_SEED);
    let verifier = signer.verifier().expect("signer has a key");
    (signer, verifier)
}

/// A fixed reference instant.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()
}

/// Memory store seeded with `ABC123` (permanent) and `TRIAL-XYZ` (by prefix only).
pub fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.insert(NewLicense::permanent("ABC123")).unwrap();
    store.insert(NewLicense::permanent("TRIAL-XYZ")).unwrap();
    store
}

/// Engine over `store` with the default trial policy and the test key.
pub fn engine_with(store: Arc<MemoryStore>) -> (ActivationEngine, ResponseVerifier) {
    let (signer, verifier) = test_signer();
    let store: Arc<dyn LicenseStore> = store;
    (
        ActivationEngine::new(store, signer, TrialPolicy::default()),
        verifier,
    )
}
