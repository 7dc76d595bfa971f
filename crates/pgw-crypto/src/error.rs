//! # Signature Error Types

use thiserror::Error;

/// Errors from webhook signing and verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The shared secret is empty.
    #[error("webhook secret must not be empty")]
    EmptySecret,

    /// The presented signature is not 64 lowercase hex characters.
    #[error("malformed signature: expected 64 hex characters, got {0}")]
    Malformed(usize),

    /// The signature does not match the payload.
    #[error("signature mismatch")]
    Mismatch,
}
