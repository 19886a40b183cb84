//! Error types for the licensing module.

use thiserror::Error;

/// Message returned to clients in place of store and internal failures.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Licensing-specific errors.
///
/// Decision-table rejections (unknown code, bound elsewhere, expired trial)
/// are [`crate::Verdict`]s, not errors.
#[derive(Debug, Error)]
pub enum LicenseError {
    /// Required request field missing or blank.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request body is not valid JSON.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// Missing or unusable signing key or store settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(String),

    /// Signature could not be decoded or did not verify.
    #[error("response signature invalid: {0}")]
    Signing(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LicenseError {
    /// HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::MalformedBody(_) => 400,
            Self::Configuration(_) | Self::Store(_) | Self::Signing(_) | Self::Serialization(_) => {
                500
            }
        }
    }

    /// Message safe to return to a client.
    ///
    /// Server-side failures collapse to a generic message; the detail is logged.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) | Self::MalformedBody(msg) => msg.clone(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Result type for license operations.
pub type LicenseResult<T> = Result<T, LicenseError>;
