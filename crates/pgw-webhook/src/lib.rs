//! # pgw-webhook: Signed Webhook Delivery
//!
//! Delivers `rat_completed` events to partner endpoints. Every delivery is
//! tracked as an [`IntegrationRecord`](pgw_core::IntegrationRecord) that is
//! persisted in `PENDING` before the network call and moved to `SENT` or
//! `ERROR` once the attempt finishes.
//!
//! ## Wire format
//!
//! ```text
//! POST {partner.webhook_base_url}
//! Content-Type: application/json
//! X-Signature:  hex(HMAC-SHA256(secret, body))
//! X-Webhook-Id: {integration record id}
//!
//! {"data":{..},"event":"rat_completed","source":"lpdp-gateway","timestamp":"..."}
//! ```
//!
//! The body is canonical JSON and is exactly the signed byte string.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod payload;
pub mod store;

pub use config::DispatcherConfig;
pub use dispatcher::{WebhookDispatcher, WebhookTarget, WEBHOOK_ID_HEADER};
pub use error::{DeliveryError, DispatchError, StoreError};
pub use payload::{WebhookPayload, EVENT_RAT_COMPLETED};
pub use store::{InMemoryIntegrationStore, IntegrationFilter, IntegrationStore, RecordVersion};
