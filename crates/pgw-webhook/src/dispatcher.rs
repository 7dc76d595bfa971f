//! # Webhook Dispatcher
//!
//! Two-phase delivery:
//!
//! 1. **Init**: build and sign the payload, create the record in `PENDING`,
//!    persist it. Nothing touches the network before the record exists.
//! 2. **Attempt**: POST the exact signed bytes. 2xx moves the record to
//!    `SENT`; timeout, transport failure, or non-2xx moves it to `ERROR`.
//!    The outcome is persisted before returning.
//!
//! There is no automatic retry. [`WebhookDispatcher::retry`] re-enters the
//! attempt phase from an `ERROR` record and increments its `retry_count`.
//!
//! Every status change is a conditional write on the version the
//! dispatcher read, so concurrent retries of one record produce exactly one
//! POST. The loser gets [`DispatchError::NotRetryable`].

use std::sync::Arc;

use chrono::Utc;
use pgw_core::{CanonicalBytes, IntegrationRecord, IntegrationStatus, PartnerType};
use pgw_crypto::{sign, WebhookSecret, SIGNATURE_HEADER};
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::config::DispatcherConfig;
use crate::error::{DeliveryError, DispatchError, StoreError};
use crate::payload::WebhookPayload;
use crate::store::{IntegrationStore, RecordVersion};

/// Header carrying the integration record id.
pub const WEBHOOK_ID_HEADER: &str = "X-Webhook-Id";

/// Where and how to deliver to one partner.
#[derive(Debug, Clone)]
pub struct WebhookTarget {
    pub partner_type: PartnerType,
    pub url: Url,
    pub secret: WebhookSecret,
}

/// Signs and delivers webhooks, tracking each delivery as an
/// [`IntegrationRecord`].
#[derive(Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    store: Arc<dyn IntegrationStore>,
    config: DispatcherConfig,
}

impl std::fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl WebhookDispatcher {
    /// Create a dispatcher persisting records to `store`.
    pub fn new(config: DispatcherConfig, store: Arc<dyn IntegrationStore>) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("pgw-webhook/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DispatchError::Client)?;
        Ok(Self {
            http,
            store,
            config,
        })
    }

    /// The backing record store.
    pub fn store(&self) -> &Arc<dyn IntegrationStore> {
        &self.store
    }

    /// Deliver a `rat_completed` event for `treatment_id` to `target`.
    ///
    /// Returns the record in `SENT` on success. A failed attempt returns
    /// [`DispatchError::Delivery`] carrying the record already persisted in
    /// `ERROR`.
    pub async fn dispatch(
        &self,
        target: &WebhookTarget,
        treatment_id: &str,
        data: Value,
    ) -> Result<IntegrationRecord, DispatchError> {
        let payload = WebhookPayload::rat_completed(data, self.config.source.clone(), Utc::now());
        let payload = serde_json::to_value(&payload)?;
        let body = CanonicalBytes::from_value(&payload)?;
        let signature = sign(&target.secret, &body)?;

        let record = IntegrationRecord::pending(treatment_id, target.partner_type.clone(), payload);
        self.store.insert(&record).await?;
        tracing::debug!(
            integration_id = %record.id,
            partner = %target.partner_type,
            treatment_id,
            "integration record created"
        );

        self.attempt(target, record, body, signature.as_str()).await
    }

    /// Retry a failed delivery.
    ///
    /// The record must exist, belong to `target.partner_type`, and be in
    /// `ERROR`. The stored payload is re-signed; since signing is
    /// deterministic the signature matches the original attempt.
    ///
    /// Of several concurrent retries on one record, exactly one reopens it;
    /// the others fail with [`DispatchError::NotRetryable`] without POSTing.
    pub async fn retry(&self, target: &WebhookTarget, id: Uuid) -> Result<IntegrationRecord, DispatchError> {
        let mut record = match self.store.get(id).await? {
            Some(r) if r.partner_type == target.partner_type => r,
            _ => return Err(DispatchError::NotFound(id)),
        };
        if record.status != IntegrationStatus::Error {
            return Err(DispatchError::NotRetryable {
                id,
                status: record.status,
            });
        }

        let body = CanonicalBytes::from_value(&record.payload)?;
        let signature = sign(&target.secret, &body)?;
        let failed = RecordVersion::of(&record);
        record.reopen_for_retry()?;
        match self.store.transition(failed, &record).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                let status = match self.store.get(id).await? {
                    Some(current) => current.status,
                    None => return Err(DispatchError::NotFound(id)),
                };
                tracing::info!(
                    integration_id = %id,
                    partner = %target.partner_type,
                    %status,
                    "retry lost to a concurrent writer"
                );
                return Err(DispatchError::NotRetryable { id, status });
            }
            Err(e) => return Err(e.into()),
        }
        tracing::info!(
            integration_id = %id,
            partner = %target.partner_type,
            retry_count = record.retry_count,
            "retrying webhook delivery"
        );

        self.attempt(target, record, body, signature.as_str()).await
    }

    async fn attempt(
        &self,
        target: &WebhookTarget,
        mut record: IntegrationRecord,
        body: CanonicalBytes,
        signature: &str,
    ) -> Result<IntegrationRecord, DispatchError> {
        let pending = RecordVersion::of(&record);
        let outcome = self.post(target, &record, body, signature).await;
        let finished_at = Utc::now();

        match outcome {
            Ok(response_body) => {
                record.mark_sent(response_body, finished_at)?;
                self.store.transition(pending, &record).await?;
                tracing::info!(
                    integration_id = %record.id,
                    partner = %target.partner_type,
                    "webhook delivered"
                );
                Ok(record)
            }
            Err(error) => {
                record.mark_failed(error.to_string(), finished_at)?;
                self.store.transition(pending, &record).await?;
                tracing::warn!(
                    integration_id = %record.id,
                    partner = %target.partner_type,
                    kind = error.kind(),
                    error = %error,
                    "webhook delivery failed"
                );
                Err(DispatchError::Delivery {
                    record: Box::new(record),
                    source: error,
                })
            }
        }
    }

    async fn post(
        &self,
        target: &WebhookTarget,
        record: &IntegrationRecord,
        body: CanonicalBytes,
        signature: &str,
    ) -> Result<String, DeliveryError> {
        let endpoint = target.url.to_string();
        let response = self
            .http
            .post(target.url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(WEBHOOK_ID_HEADER, record.id.to_string())
            .body(body.into_bytes())
            .send()
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(&endpoint, e))?;
        let text = truncate(text, self.config.max_stored_body_bytes);

        if status.is_success() {
            Ok(text)
        } else {
            Err(DeliveryError::NonSuccessStatus {
                endpoint,
                status: status.as_u16(),
                body: text,
            })
        }
    }

    fn transport_error(&self, endpoint: &str, error: reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            DeliveryError::Network {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        }
    }
}

/// Cut `text` to at most `max` bytes on a char boundary.
fn truncate(mut text: String, max: usize) -> String {
    if text.len() > max {
        let mut cut = max;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef".into(), 3), "abc");
        assert_eq!(truncate("ñññ".into(), 3), "ñ");
        assert_eq!(truncate("short".into(), 100), "short");
    }
}
