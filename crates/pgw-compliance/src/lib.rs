//! # pgw-compliance: Risk Scoring and Required Documents
//!
//! Two pure, deterministic stages of the write path:
//!
//! ```text
//! TreatmentDescription --RiskScoringEngine--> RiskAssessment
//!        RiskAssessment --DocumentRequirementResolver--> Vec<RequiredDocument>
//! ```
//!
//! Neither stage performs I/O or can fail for well-typed input. Weights,
//! thresholds, and document rules are configuration structs whose `Default`
//! carries the documented constants.

pub mod documents;
pub mod scoring;

pub use documents::{DocumentRequirementResolver, DocumentRule, DocumentRules};
pub use scoring::{RiskScoringEngine, RiskThresholds, RiskWeights, ScoringConfig};

use pgw_core::{RequiredDocument, RiskAssessment, TreatmentDescription};

/// Score a treatment and resolve its documents with default configuration.
pub fn evaluate(treatment: &TreatmentDescription) -> (RiskAssessment, Vec<RequiredDocument>) {
    let assessment = RiskScoringEngine::default().score(treatment);
    let documents = DocumentRequirementResolver::default().resolve(&assessment);
    (assessment, documents)
}
