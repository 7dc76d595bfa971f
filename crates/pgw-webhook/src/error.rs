//! Webhook delivery error types.

use pgw_core::{CanonicalizationError, IntegrationRecord, IntegrationStatus, StateTransitionError};
use pgw_crypto::SignatureError;
use uuid::Uuid;

/// Why a single delivery attempt failed. Recorded on the integration record
/// as its `error_message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// No response within the configured timeout.
    #[error("timed out after {timeout_ms}ms delivering to {endpoint}")]
    Timeout { endpoint: String, timeout_ms: u64 },
    /// Connection, TLS, or protocol failure.
    #[error("network error delivering to {endpoint}: {message}")]
    Network { endpoint: String, message: String },
    /// The partner answered with a non-2xx status.
    #[error("{endpoint} returned {status}: {body}")]
    NonSuccessStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
}

impl DeliveryError {
    /// Stable short name for metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Network { .. } => "network",
            Self::NonSuccessStatus { .. } => "non_success_status",
        }
    }
}

/// Errors from integration record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A record with this id already exists.
    #[error("integration record {0} already exists")]
    Duplicate(Uuid),
    /// No record with this id.
    #[error("integration record {0} not found")]
    NotFound(Uuid),
    /// A conditional write found the record in a different version.
    #[error("integration record {0} was modified concurrently")]
    Conflict(Uuid),
    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from [`WebhookDispatcher`](crate::WebhookDispatcher) operations.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The attempt ran and failed. The record is already persisted in ERROR.
    #[error("webhook delivery failed: {source}")]
    Delivery {
        record: Box<IntegrationRecord>,
        #[source]
        source: DeliveryError,
    },
    /// Retry requested for a record that is not in ERROR.
    #[error("integration record {id} is {status} and cannot be retried")]
    NotRetryable { id: Uuid, status: IntegrationStatus },
    /// Retry requested for an unknown record or one owned by another partner.
    #[error("integration record {0} not found")]
    NotFound(Uuid),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] CanonicalizationError),
    #[error("state transition error: {0}")]
    Transition(#[from] StateTransitionError),
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
    /// The HTTP client could not be constructed.
    #[error("HTTP client initialization failed: {0}")]
    Client(reqwest::Error),
}
