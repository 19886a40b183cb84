//! Request and response bodies of the activation endpoint.

use crate::error::{LicenseError, LicenseResult};
use crate::record::format_timestamp;
use crate::signing::{ResponseSigner, SignedPayload};
use crate::verdict::Verdict;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message for requests missing either field.
pub const MISSING_FIELDS_MESSAGE: &str = "licenseCode and machineId are required";

/// Request body: `{"licenseCode": "...", "machineId": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationRequest {
    #[serde(default)]
    pub license_code: Option<String>,
    #[serde(default)]
    pub machine_id: Option<String>,
}

impl ActivationRequest {
    /// Creates a request with both fields set.
    #[must_use]
    pub fn new(license_code: impl Into<String>, machine_id: impl Into<String>) -> Self {
        Self {
            license_code: Some(license_code.into()),
            machine_id: Some(machine_id.into()),
        }
    }

    /// Parses a raw JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedBody`] if the body is not a JSON
    /// object of the expected shape.
    pub fn from_json(body: &[u8]) -> LicenseResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| LicenseError::MalformedBody(format!("invalid JSON body: {e}")))
    }

    /// Returns `(code, machine_id)` if both are present and not blank.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::InvalidRequest`] otherwise.
    pub fn validate(&self) -> LicenseResult<(&str, &str)> {
        match (non_blank(&self.license_code), non_blank(&self.machine_id)) {
            (Some(code), Some(machine_id)) => Ok((code, machine_id)),
            _ => Err(LicenseError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string())),
        }
    }

    /// The machine id as supplied, for echoing into the signed payload.
    #[must_use]
    pub fn machine_id(&self) -> Option<&str> {
        self.machine_id.as_deref()
    }
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// Response body returned for every outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationResponse {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub expiry_date: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
}

impl ActivationResponse {
    /// Rebuilds the payload the signature covers, given the machine id the
    /// request carried.
    #[must_use]
    pub fn signed_payload<'a>(&'a self, machine_id: Option<&'a str>) -> SignedPayload<'a> {
        SignedPayload {
            success: self.success,
            message: &self.message,
            machine_id,
            is_trial: self.is_trial,
            expiry_date: self.expiry_date.as_deref(),
        }
    }
}

/// A signed response body with its HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedResponse {
    pub status: u16,
    pub body: ActivationResponse,
}

impl SignedResponse {
    /// Builds and signs a response from its parts.
    #[must_use]
    pub fn build(
        status: u16,
        success: bool,
        message: String,
        machine_id: Option<&str>,
        is_trial: bool,
        expires_at: Option<DateTime<Utc>>,
        signer: &ResponseSigner,
    ) -> Self {
        let mut body = ActivationResponse {
            success,
            message,
            is_trial,
            expiry_date: expires_at.as_ref().map(format_timestamp),
            signature: None,
        };
        body.signature = signer.sign(&body.signed_payload(machine_id));
        Self { status, body }
    }

    /// Signed response for a decision-table outcome.
    #[must_use]
    pub fn from_verdict(verdict: &Verdict, machine_id: &str, signer: &ResponseSigner) -> Self {
        Self::build(
            verdict.status_code(),
            verdict.is_success(),
            verdict.message(),
            Some(machine_id),
            verdict.is_trial(),
            verdict.expires_at(),
            signer,
        )
    }

    /// Signed response for a request that failed before or outside the
    /// decision table.
    #[must_use]
    pub fn from_error(
        error: &LicenseError,
        machine_id: Option<&str>,
        signer: &ResponseSigner,
    ) -> Self {
        Self::build(
            error.status_code(),
            false,
            error.public_message(),
            machine_id,
            false,
            None,
            signer,
        )
    }

    /// Signed 405 response for methods other than POST.
    #[must_use]
    pub fn method_not_allowed(signer: &ResponseSigner) -> Self {
        Self::build(
            405,
            false,
            "Method not allowed".to_string(),
            None,
            false,
            None,
            signer,
        )
    }
}
