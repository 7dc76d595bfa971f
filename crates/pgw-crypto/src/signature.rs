//! # HMAC-SHA256 Webhook Signatures
//!
//! ## Security Invariant
//!
//! [`sign`] accepts only [`CanonicalBytes`]. The bytes that get signed are
//! the bytes that go on the wire, so a partner verifying the raw request
//! body reproduces the same MAC.

use hmac::{Hmac, Mac};
use pgw_core::CanonicalBytes;
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature on outbound webhooks.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Shared secret between the gateway and one partner.
///
/// The bytes are wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct WebhookSecret(Zeroizing<Vec<u8>>);

impl WebhookSecret {
    /// Wrap secret bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::EmptySecret`] for an empty secret.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SignatureError> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        Ok(Self(bytes))
    }

    /// Generate a fresh random secret rendered as `whsec_` + 64 hex chars.
    pub fn generate() -> String {
        let mut raw = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *raw);
        let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
        format!("whsec_{hex}")
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WebhookSecret([REDACTED])")
    }
}

/// Lowercase hex HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSignature(String);

impl WebhookSignature {
    /// Parse a presented signature, normalizing case.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Malformed`] unless the input is 64 hex chars.
    pub fn parse(value: &str) -> Result<Self, SignatureError> {
        let trimmed = value.trim();
        if trimmed.len() != 64 || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SignatureError::Malformed(trimmed.len()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// The hex string, suitable for the [`SIGNATURE_HEADER`] value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WebhookSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sign canonical payload bytes.
///
/// Deterministic: identical payload and secret give an identical signature.
pub fn sign(secret: &WebhookSecret, payload: &CanonicalBytes) -> Result<WebhookSignature, SignatureError> {
    mac_hex(secret, payload.as_bytes()).map(WebhookSignature)
}

/// Verify a presented signature against the raw request body.
///
/// The comparison runs in constant time with respect to the signature
/// content.
///
/// # Errors
///
/// [`SignatureError::Malformed`] for a non-hex signature,
/// [`SignatureError::Mismatch`] when it does not match.
pub fn verify(secret: &WebhookSecret, body: &[u8], presented: &str) -> Result<(), SignatureError> {
    let presented = WebhookSignature::parse(presented)?;
    let expected = mac_hex(secret, body)?;
    if bool::from(expected.as_bytes().ct_eq(presented.as_str().as_bytes())) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

fn mac_hex(secret: &WebhookSecret, message: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::EmptySecret)?;
    mac.update(message);
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect())
}
