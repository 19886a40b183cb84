//! Ed25519 signing and verification of activation responses.
//!
//! The signature covers the compact JSON encoding of [`SignedPayload`]:
//!
//! ```text
//! {"success":true,"message":"License activated","machineId":"M1","isTrial":false,"expiryDate":null}
//! ```
//!
//! Field order is fixed by the struct declaration, so a verifier holding the
//! public key can rebuild the exact bytes from a response and the machine id
//! it sent. Signatures are standard base64 (padded).

use crate::error::{LicenseError, LicenseResult};
use crate::response::ActivationResponse;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::Serialize;
use tracing::{debug, error};

/// The exact field set covered by a response signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedPayload<'a> {
    pub success: bool,
    pub message: &'a str,
    pub machine_id: Option<&'a str>,
    pub is_trial: bool,
    pub expiry_date: Option<&'a str>,
}

impl SignedPayload<'_> {
    /// Deterministic serialization that is signed and verified.
    pub fn canonical_bytes(&self) -> LicenseResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Signs responses with the configured private key.
///
/// Without a key every signature is `None`; the caller is expected to have
/// reported the missing key as a configuration error at startup.
#[derive(Clone)]
pub struct ResponseSigner {
    key: Option<SigningKey>,
}

impl std::fmt::Debug for ResponseSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSigner")
            .field("enabled", &self.key.is_some())
            .finish()
    }
}

impl ResponseSigner {
    /// Creates a signer from an Ed25519 signing key.
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        Self { key: Some(key) }
    }

    /// A signer with no key; all signatures are null.
    #[must_use]
    pub fn disabled() -> Self {
        Self { key: None }
    }

    /// Creates a signer from a raw 32-byte secret seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(seed))
    }

    /// Generates a fresh random signing key.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(SigningKey::generate(&mut OsRng))
    }

    /// Parses a PKCS#8 PEM private key.
    ///
    /// Literal `\n` sequences are turned into newlines first, since keys
    /// passed through environment variables are commonly flattened that way.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Configuration`] if the PEM is not an Ed25519
    /// PKCS#8 private key.
    pub fn from_pkcs8_pem(pem: &str) -> LicenseResult<Self> {
        let pem = pem.trim().replace("\\n", "\n");
        let key = SigningKey::from_pkcs8_pem(&pem)
            .map_err(|e| LicenseError::Configuration(format!("invalid signing key: {e}")))?;
        Ok(Self::new(key))
    }

    /// Returns true if a key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.key.is_some()
    }

    /// Encodes the private key as PKCS#8 PEM.
    ///
    /// # Errors
    ///
    /// Fails if the signer is disabled or encoding fails.
    pub fn to_pkcs8_pem(&self) -> LicenseResult<String> {
        let key = self.require_key()?;
        let pem = key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| LicenseError::Configuration(format!("cannot encode signing key: {e}")))?;
        Ok(pem.as_str().to_owned())
    }

    /// Returns the verifier for this signer's public key.
    #[must_use]
    pub fn verifier(&self) -> Option<ResponseVerifier> {
        self.key
            .as_ref()
            .map(|key| ResponseVerifier(key.verifying_key()))
    }

    /// Signs a payload, returning the base64 signature.
    ///
    /// Returns `None` when no key is configured or the payload cannot be
    /// serialized; signing never fails the request.
    #[must_use]
    pub fn sign(&self, payload: &SignedPayload<'_>) -> Option<String> {
        let Some(key) = self.key.as_ref() else {
            debug!("no signing key configured; response signature is null");
            return None;
        };
        match payload.canonical_bytes() {
            Ok(bytes) => Some(BASE64.encode(key.sign(&bytes).to_bytes())),
            Err(e) => {
                error!(error = %e, "failed to serialize signed payload");
                None
            }
        }
    }

    fn require_key(&self) -> LicenseResult<&SigningKey> {
        self.key
            .as_ref()
            .ok_or_else(|| LicenseError::Configuration("no signing key configured".to_string()))
    }
}

/// Verifies response signatures with an Ed25519 public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseVerifier(VerifyingKey);

impl ResponseVerifier {
    /// Creates a verifier from a raw 32-byte public key.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Configuration`] if the bytes are not a valid point.
    pub fn from_bytes(bytes: &[u8; 32]) -> LicenseResult<Self> {
        VerifyingKey::from_bytes(bytes)
            .map(Self)
            .map_err(|_| LicenseError::Configuration("invalid public key".to_string()))
    }

    /// Parses a SubjectPublicKeyInfo PEM public key.
    pub fn from_public_key_pem(pem: &str) -> LicenseResult<Self> {
        VerifyingKey::from_public_key_pem(pem.trim())
            .map(Self)
            .map_err(|e| LicenseError::Configuration(format!("invalid public key: {e}")))
    }

    /// Returns the raw 32-byte public key.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Encodes the public key as SubjectPublicKeyInfo PEM.
    pub fn to_public_key_pem(&self) -> LicenseResult<String> {
        self.0
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| LicenseError::Configuration(format!("cannot encode public key: {e}")))
    }

    /// Verifies a base64 signature over a payload.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::Signing`] if the signature is malformed or
    /// does not match the payload.
    pub fn verify(&self, payload: &SignedPayload<'_>, signature_b64: &str) -> LicenseResult<()> {
        let sig_bytes = BASE64
            .decode(signature_b64)
            .map_err(|e| LicenseError::Signing(format!("invalid signature base64: {e}")))?;
        let signature = Signature::from_slice(&sig_bytes)
            .map_err(|_| LicenseError::Signing("invalid signature length".to_string()))?;
        self.0
            .verify(&payload.canonical_bytes()?, &signature)
            .map_err(|_| LicenseError::Signing("signature does not match payload".to_string()))
    }

    /// Verifies a response as received by the client that sent `machine_id`.
    ///
    /// A response without a signature never verifies.
    pub fn verify_response(
        &self,
        response: &ActivationResponse,
        machine_id: Option<&str>,
    ) -> LicenseResult<()> {
        let signature = response
            .signature
            .as_deref()
            .ok_or_else(|| LicenseError::Signing("response is unsigned".to_string()))?;
        self.verify(&response.signed_payload(machine_id), signature)
    }
}
