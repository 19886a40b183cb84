//! Property-based tests for response signatures.
//!
//! Every signed field must be covered: changing any one of them after
//! signing has to break verification.

mod common;

use common::test_signer;
use keygate_license::{ActivationResponse, SignedResponse};
use proptest::prelude::*;

fn text_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,64}").unwrap()
}

fn expiry_strategy() -> impl Strategy<Value = Option<String>> {
    prop::option::of(Just("2026-10-18T12:10:00.000Z".to_string()))
}

#[derive(Debug, Clone)]
enum Tamper {
    Success,
    Message(String),
    MachineId(String),
    IsTrial,
    ExpiryDate(Option<String>),
}

fn tamper_strategy() -> impl Strategy<Value = Tamper> {
    prop_oneof![
        Just(Tamper::Success),
        text_strategy().prop_map(Tamper::Message),
        text_strategy().prop_map(Tamper::MachineId),
        Just(Tamper::IsTrial),
        prop::option::of(Just("2099-01-01T00:00:00.000Z".to_string())).prop_map(Tamper::ExpiryDate),
    ]
}

proptest! {
    /// Any response the server signs verifies for the machine that asked.
    #[test]
    fn signed_responses_verify(
        success in any::<bool>(),
        message in text_strategy(),
        machine_id in text_strategy(),
        is_trial in any::<bool>(),
        expiry in expiry_strategy(),
    ) {
        let (signer, verifier) = test_signer();
        let expires_at = expiry
            .as_deref()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&chrono::Utc));
        let resp = SignedResponse::build(200, success, message, Some(&machine_id), is_trial, expires_at, &signer);
        prop_assert!(verifier.verify_response(&resp.body, Some(&machine_id)).is_ok());
    }

    /// Changing any signed field invalidates the signature.
    #[test]
    fn tampering_invalidates(
        message in text_strategy(),
        machine_id in text_strategy(),
        expiry in expiry_strategy(),
        tamper in tamper_strategy(),
    ) {
        let (signer, verifier) = test_signer();
        let expires_at = expiry
            .as_deref()
            .map(|s| chrono::DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&chrono::Utc));
        let resp = SignedResponse::build(200, true, message, Some(&machine_id), false, expires_at, &signer);

        let mut body: ActivationResponse = resp.body.clone();
        let mut claimed_machine = machine_id.clone();
        let changed = match tamper {
            Tamper::Success => { body.success = !body.success; true }
            Tamper::Message(m) => { let changed = m != body.message; body.message = m; changed }
            Tamper::MachineId(m) => { let changed = m != claimed_machine; claimed_machine = m; changed }
            Tamper::IsTrial => { body.is_trial = !body.is_trial; true }
            Tamper::ExpiryDate(e) => { let changed = e != body.expiry_date; body.expiry_date = e; changed }
        };
        prop_assume!(changed);

        prop_assert!(verifier.verify_response(&body, Some(&claimed_machine)).is_err());
    }
}
