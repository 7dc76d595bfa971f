//! # Integration Records
//!
//! One record per webhook delivery. The dispatcher creates it in
//! [`IntegrationStatus::Pending`] before touching the network and moves it to
//! `Sent` or `Error` exactly once per attempt.
//!
//! ## State machine
//!
//! ```text
//!   PENDING ──success──▶ SENT      (terminal)
//!      │
//!      └──failure──▶ ERROR ──reopen_for_retry──▶ PENDING
//! ```
//!
//! `SENT` never transitions. `ERROR → PENDING` only happens through the
//! explicit retry path, which increments `retry_count`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::StateTransitionError;
use crate::partner::PartnerType;

/// Delivery status of an integration record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrationStatus {
    /// Created, delivery in flight or about to start.
    Pending,
    /// Partner acknowledged with a 2xx response.
    Sent,
    /// Last attempt failed.
    Error,
}

impl IntegrationStatus {
    /// Return the stored representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Error => "ERROR",
        }
    }

    /// Whether no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

impl std::fmt::Display for IntegrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IntegrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "ERROR" => Ok(Self::Error),
            other => Err(format!("unknown integration status: {other}")),
        }
    }
}

/// A webhook delivery tracked from creation to outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationRecord {
    /// Record identifier, also sent as `X-Webhook-Id`.
    pub id: Uuid,
    /// Treatment (RAT) the delivery belongs to.
    pub treatment_id: String,
    /// Receiving partner.
    pub partner_type: PartnerType,
    /// Current delivery status.
    pub status: IntegrationStatus,
    /// Exact webhook payload that was (or will be) signed and sent.
    pub payload: Value,
    /// Response body of the successful delivery.
    pub response_body: Option<String>,
    /// Error message of the last failed attempt.
    pub error_message: Option<String>,
    /// Number of explicit retries; zero until the first retry.
    pub retry_count: u32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the last attempt finished.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the partner acknowledged delivery.
    pub success_at: Option<DateTime<Utc>>,
}

impl IntegrationRecord {
    /// Create a new record in `PENDING`.
    pub fn pending(treatment_id: impl Into<String>, partner_type: PartnerType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            treatment_id: treatment_id.into(),
            partner_type,
            status: IntegrationStatus::Pending,
            payload,
            response_body: None,
            error_message: None,
            retry_count: 0,
            created_at: Utc::now(),
            last_attempt_at: None,
            success_at: None,
        }
    }

    /// `PENDING → SENT`, storing the partner's response body.
    pub fn mark_sent(
        &mut self,
        response_body: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StateTransitionError> {
        self.require_pending(IntegrationStatus::Sent)?;
        self.status = IntegrationStatus::Sent;
        self.response_body = Some(response_body.into());
        self.error_message = None;
        self.last_attempt_at = Some(at);
        self.success_at = Some(at);
        Ok(())
    }

    /// `PENDING → ERROR`, storing the failure message.
    pub fn mark_failed(
        &mut self,
        error_message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<(), StateTransitionError> {
        self.require_pending(IntegrationStatus::Error)?;
        self.status = IntegrationStatus::Error;
        self.error_message = Some(error_message.into());
        self.last_attempt_at = Some(at);
        Ok(())
    }

    /// `ERROR → PENDING` for an explicit retry. Increments `retry_count`.
    pub fn reopen_for_retry(&mut self) -> Result<(), StateTransitionError> {
        if self.status != IntegrationStatus::Error {
            return Err(StateTransitionError::InvalidTransition {
                from: self.status.to_string(),
                to: IntegrationStatus::Pending.to_string(),
                reason: "only records in ERROR can be retried".into(),
            });
        }
        self.status = IntegrationStatus::Pending;
        self.retry_count = self.retry_count.saturating_add(1);
        Ok(())
    }

    fn require_pending(&self, to: IntegrationStatus) -> Result<(), StateTransitionError> {
        if self.status != IntegrationStatus::Pending {
            return Err(StateTransitionError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
                reason: "an attempt can only complete from PENDING".into(),
            });
        }
        Ok(())
    }
}
