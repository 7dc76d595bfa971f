//! # pgw-crypto: Webhook Signing for the Partner Integration Gateway
//!
//! Partners authenticate pushed webhooks by recomputing an HMAC-SHA256 over
//! the exact request body with their shared secret and comparing it with the
//! `X-Signature` header.
//!
//! - [`WebhookSecret`] holds the shared secret and zeroizes it on drop.
//! - [`sign`] takes [`CanonicalBytes`](pgw_core::CanonicalBytes), so every
//!   signature is computed over canonical JSON and is deterministic for a
//!   given payload and secret.
//! - [`verify`] compares signatures in constant time.

pub mod error;
pub mod signature;

pub use error::SignatureError;
pub use signature::{sign, verify, WebhookSecret, WebhookSignature, SIGNATURE_HEADER};
