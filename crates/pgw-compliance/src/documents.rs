//! # Document Requirement Resolver
//!
//! Maps a [`RiskAssessment`] to the legal documents the controller must
//! produce. The output depends only on the assessment's level and factors,
//! and documents are always emitted in the order EIPD, CONSULTA_PREVIA, DPA.

use pgw_core::{DocumentType, RequiredDocument, RiskAssessment, RiskFactor, Urgency};
use serde::{Deserialize, Serialize};

/// Urgency, deadline, and legal basis of one document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRule {
    /// Urgency classification.
    pub urgency: Urgency,
    /// Days until due.
    pub deadline_days: u32,
    /// Legal provision cited in the requirement.
    pub legal_basis_ref: String,
}

impl DocumentRule {
    fn materialize(&self, document_type: DocumentType) -> RequiredDocument {
        RequiredDocument {
            document_type,
            urgency: self.urgency,
            deadline_days: self.deadline_days,
            legal_basis_ref: self.legal_basis_ref.clone(),
        }
    }
}

/// Rules for every document type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentRules {
    /// Impact evaluation, required at `ALTO` and above.
    pub eipd: DocumentRule,
    /// Prior consultation, required at `ALTO` and above.
    pub consulta_previa: DocumentRule,
    /// Data-processing agreement, required on international transfer.
    pub dpa: DocumentRule,
}

impl Default for DocumentRules {
    fn default() -> Self {
        Self {
            eipd: DocumentRule {
                urgency: Urgency::Alta,
                deadline_days: 15,
                legal_basis_ref: "Ley 21.719, art. 15 ter".into(),
            },
            consulta_previa: DocumentRule {
                urgency: Urgency::Critica,
                deadline_days: 5,
                legal_basis_ref: "Ley 21.719, art. 15 quáter".into(),
            },
            dpa: DocumentRule {
                urgency: Urgency::Media,
                deadline_days: 30,
                legal_basis_ref: "Ley 21.719, arts. 27 y 28".into(),
            },
        }
    }
}

/// Pure resolver from assessments to required documents.
#[derive(Debug, Clone, Default)]
pub struct DocumentRequirementResolver {
    rules: DocumentRules,
}

impl DocumentRequirementResolver {
    /// Create a resolver with the given rules.
    pub fn new(rules: DocumentRules) -> Self {
        Self { rules }
    }

    /// Documents required by an assessment.
    pub fn resolve(&self, assessment: &RiskAssessment) -> Vec<RequiredDocument> {
        let mut documents = Vec::with_capacity(3);
        if assessment.level.requires_impact_evaluation() {
            documents.push(self.rules.eipd.materialize(DocumentType::Eipd));
            documents.push(
                self.rules
                    .consulta_previa
                    .materialize(DocumentType::ConsultaPrevia),
            );
        }
        if assessment.has_factor(RiskFactor::InternationalTransfer) {
            documents.push(self.rules.dpa.materialize(DocumentType::Dpa));
        }
        documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgw_core::RiskLevel;

    fn assessment(level: RiskLevel, factors: Vec<RiskFactor>) -> RiskAssessment {
        RiskAssessment {
            level,
            score: 0,
            factors,
        }
    }

    fn kinds(docs: &[RequiredDocument]) -> Vec<(DocumentType, Urgency, u32)> {
        docs.iter()
            .map(|d| (d.document_type, d.urgency, d.deadline_days))
            .collect()
    }

    #[test]
    fn critico_with_transfer_requires_all_three_in_order() {
        let docs = DocumentRequirementResolver::default().resolve(&assessment(
            RiskLevel::Critico,
            vec![RiskFactor::HealthData, RiskFactor::InternationalTransfer],
        ));
        assert_eq!(
            kinds(&docs),
            vec![
                (DocumentType::Eipd, Urgency::Alta, 15),
                (DocumentType::ConsultaPrevia, Urgency::Critica, 5),
                (DocumentType::Dpa, Urgency::Media, 30),
            ]
        );
        assert!(docs.iter().all(|d| d.legal_basis_ref.starts_with("Ley 21.719")));
    }

    #[test]
    fn alto_without_transfer_requires_eipd_and_consultation() {
        let docs = DocumentRequirementResolver::default()
            .resolve(&assessment(RiskLevel::Alto, vec![RiskFactor::HealthData]));
        assert_eq!(
            kinds(&docs),
            vec![
                (DocumentType::Eipd, Urgency::Alta, 15),
                (DocumentType::ConsultaPrevia, Urgency::Critica, 5),
            ]
        );
    }

    #[test]
    fn medio_with_transfer_requires_only_dpa() {
        let docs = DocumentRequirementResolver::default().resolve(&assessment(
            RiskLevel::Medio,
            vec![RiskFactor::InternationalTransfer],
        ));
        assert_eq!(kinds(&docs), vec![(DocumentType::Dpa, Urgency::Media, 30)]);
    }

    #[test]
    fn low_levels_without_transfer_require_nothing() {
        let resolver = DocumentRequirementResolver::default();
        assert!(resolver.resolve(&assessment(RiskLevel::Bajo, vec![])).is_empty());
        assert!(resolver
            .resolve(&assessment(RiskLevel::Medio, vec![RiskFactor::HighVolume]))
            .is_empty());
    }

    #[test]
    fn score_does_not_influence_resolution() {
        let resolver = DocumentRequirementResolver::default();
        let mut a = assessment(RiskLevel::Alto, vec![]);
        let first = resolver.resolve(&a);
        a.score = 9_999;
        assert_eq!(resolver.resolve(&a), first);
    }

    #[test]
    fn full_pipeline_scenario() {
        use pgw_core::{DataCategory, TreatmentDescription};
        let (assessment, docs) = crate::evaluate(&TreatmentDescription {
            categories: vec![DataCategory::Health, DataCategory::Financial],
            subject_count: 15_000,
            international_transfer: true,
            automated_decisions: false,
        });
        assert_eq!(assessment.score, 115);
        assert_eq!(assessment.level, RiskLevel::Critico);
        assert_eq!(docs.len(), 3);
    }
}
