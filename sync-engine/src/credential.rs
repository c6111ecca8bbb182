//! Bearer credential handling.
//!
//! The relay authenticates requests with a bearer token. Device identity
//! is derived from the `deviceId` claim embedded in that token - never
//! generated locally - so the vector-clock key and the relay's partition
//! key always agree. The client reads the claim without verifying the
//! signature; signature verification is the relay's job.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use thiserror::Error;

use sync_types::DeviceId;

/// Credential errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The token is not in the expected three-part form.
    #[error("malformed credential: expected header.payload.signature")]
    Malformed,

    /// The claims payload failed to decode.
    #[error("credential payload failed to decode: {0}")]
    Decode(String),

    /// The token carries no device identity claim.
    #[error("credential is missing the deviceId claim")]
    MissingDeviceClaim,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(rename = "deviceId")]
    device_id: Option<String>,
}

/// An opaque bearer credential issued by the authentication service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a bearer token.
    pub fn new(token: &str) -> Self {
        Self(token.trim().to_string())
    }

    /// The raw token, for the `Authorization` header.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Extract the device identity claim.
    pub fn device_id(&self) -> Result<DeviceId, CredentialError> {
        let mut parts = self.0.split('.');
        let (_header, payload) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(h), Some(p), Some(_sig), None) if !h.is_empty() && !p.is_empty() => (h, p),
            _ => return Err(CredentialError::Malformed),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| CredentialError::Decode(e.to_string()))?;
        let claims: Claims =
            serde_json::from_slice(&bytes).map_err(|e| CredentialError::Decode(e.to_string()))?;

        claims
            .device_id
            .filter(|id| !id.is_empty())
            .map(DeviceId::from)
            .ok_or(CredentialError::MissingDeviceClaim)
    }
}

// Don't leak the token in debug output
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}
