//! # API Route Modules
//!
//! - `treatments`: Write path: scoring, required documents, signed webhook
//!   delivery.
//! - `risk`: Stateless scoring of a treatment description.
//! - `integrations`: The caller's webhook deliveries and explicit retry.
//! - `audit`: The caller's own access log.
//! - `partner`: The caller's resolved profile and rate-limit budget.

pub mod audit;
pub mod integrations;
pub mod partner;
pub mod risk;
pub mod treatments;
