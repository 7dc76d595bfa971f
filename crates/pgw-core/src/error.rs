//! # Error Hierarchy
//!
//! Structured error types shared across the gateway, built with `thiserror`.
//! No `Box<dyn Error>`, no `.unwrap()` outside tests.

use thiserror::Error;

/// Top-level error type for gateway domain operations.
#[derive(Error, Debug)]
pub enum PgwError {
    /// Canonicalization failure while preparing bytes for signing or hashing.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    /// Integration record state machine violation.
    #[error("state transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// Domain primitive validation failure.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors during canonical serialization.
#[derive(Error, Debug)]
pub enum CanonicalizationError {
    /// The value could not be converted to or written as JSON.
    #[error("serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Errors during integration record state transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    /// The attempted transition is not valid from the current state.
    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        /// The current state name.
        from: String,
        /// The attempted target state name.
        to: String,
        /// Human-readable reason for the rejection.
        reason: String,
    },
}

/// Validation errors for domain primitive newtypes.
///
/// Each variant carries the rejected input so that operators can diagnose
/// a bad partner table without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Partner type is empty or contains characters outside `[a-z0-9_-]`.
    #[error("invalid partner type: \"{0}\" (expected 1-64 chars of [a-z0-9_-])")]
    InvalidPartnerType(String),

    /// Partner tier is empty or whitespace-only.
    #[error("partner tier must not be empty")]
    EmptyTier,

    /// Feature name is empty or whitespace-only.
    #[error("feature name must not be empty")]
    EmptyFeature,

    /// Display name is empty or whitespace-only.
    #[error("display name for partner \"{0}\" must not be empty")]
    EmptyDisplayName(String),

    /// Webhook URL uses a scheme other than http/https.
    #[error("webhook URL for partner \"{partner}\" must use http or https, got \"{scheme}\"")]
    UnsupportedWebhookScheme {
        /// The partner whose URL was rejected.
        partner: String,
        /// The offending scheme.
        scheme: String,
    },
}
