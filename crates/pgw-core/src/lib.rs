#![deny(missing_docs)]

//! # pgw-core: Foundational Types for the Partner Integration Gateway
//!
//! Every other crate in the workspace depends on this one. It has no
//! internal crate dependencies: only `serde`, `serde_json`, `thiserror`,
//! `chrono`, `uuid`, `sha2`, and `url` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for identifiers.** A [`PartnerType`] is validated on
//!    construction and cannot be confused with a free-form string.
//!
//! 2. **[`CanonicalBytes`] is the sole path to signed bytes.** Webhook
//!    signatures and audit chain hashes are computed over canonical JSON
//!    (sorted keys, compact separators), never over ad-hoc serializations.
//!
//! 3. **Closed enums for compliance outcomes.** [`RiskLevel`], [`RiskFactor`],
//!    [`DocumentType`] and [`Urgency`] serialize to the exact strings partners
//!    receive on the wire.
//!
//! 4. **Explicit state transitions.** [`IntegrationRecord`] only changes
//!    status through methods that reject illegal transitions.

pub mod audit;
pub mod canonical;
pub mod document;
pub mod error;
pub mod integration;
pub mod masking;
pub mod partner;
pub mod risk;
pub mod treatment;

pub use audit::{AuditEntry, GENESIS_HASH};
pub use canonical::CanonicalBytes;
pub use document::{DocumentType, RequiredDocument, Urgency};
pub use error::{CanonicalizationError, PgwError, StateTransitionError, ValidationError};
pub use integration::{IntegrationRecord, IntegrationStatus};
pub use masking::mask_secret;
pub use partner::{features, PartnerProfile, PartnerTier, PartnerType};
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
pub use treatment::{DataCategory, TreatmentDescription};
