//! # Risk Assessment
//!
//! Output of the risk scoring engine. An assessment is computed fresh per
//! call and never mutated afterwards.

use serde::{Deserialize, Serialize};

/// Legal-risk level of a treatment.
///
/// Declaration order gives `Bajo < Medio < Alto < Critico`, so levels can be
/// compared directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    /// Score below the medium threshold.
    Bajo,
    /// Medium risk.
    Medio,
    /// High risk; impact evaluation required.
    Alto,
    /// Critical risk; impact evaluation and prior consultation required.
    Critico,
}

impl RiskLevel {
    /// Return the wire representation of this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bajo => "BAJO",
            Self::Medio => "MEDIO",
            Self::Alto => "ALTO",
            Self::Critico => "CRITICO",
        }
    }

    /// Whether this level mandates an impact evaluation.
    pub fn requires_impact_evaluation(&self) -> bool {
        *self >= Self::Alto
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A risk factor triggered by a treatment.
///
/// Serialized as the human-readable label used in audit and alerting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactor {
    /// Sensitive health data is processed.
    #[serde(rename = "Datos sensibles de salud")]
    HealthData,
    /// Financial data is processed.
    #[serde(rename = "Datos financieros")]
    FinancialData,
    /// More subjects than the high-volume threshold.
    #[serde(rename = "Alto volumen de titulares")]
    HighVolume,
    /// Data is transferred outside the country.
    #[serde(rename = "Transferencia internacional de datos")]
    InternationalTransfer,
    /// Automated decision-making is applied.
    #[serde(rename = "Decisiones automatizadas")]
    AutomatedDecisions,
}

impl RiskFactor {
    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::HealthData => "Datos sensibles de salud",
            Self::FinancialData => "Datos financieros",
            Self::HighVolume => "Alto volumen de titulares",
            Self::InternationalTransfer => "Transferencia internacional de datos",
            Self::AutomatedDecisions => "Decisiones automatizadas",
        }
    }
}

impl std::fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Weighted risk score, its level, and the factors that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Level derived from the score.
    pub level: RiskLevel,
    /// Sum of triggered factor weights; unbounded above.
    pub score: u32,
    /// Triggered factors in trigger order.
    pub factors: Vec<RiskFactor>,
}

impl RiskAssessment {
    /// Whether the given factor was triggered.
    pub fn has_factor(&self, factor: RiskFactor) -> bool {
        self.factors.contains(&factor)
    }

    /// Factor labels in trigger order.
    pub fn factor_labels(&self) -> Vec<&'static str> {
        self.factors.iter().map(RiskFactor::label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering() {
        assert!(RiskLevel::Bajo < RiskLevel::Medio);
        assert!(RiskLevel::Medio < RiskLevel::Alto);
        assert!(RiskLevel::Alto < RiskLevel::Critico);
        assert!(RiskLevel::Alto.requires_impact_evaluation());
        assert!(!RiskLevel::Medio.requires_impact_evaluation());
    }

    #[test]
    fn level_serializes_screaming() {
        assert_eq!(serde_json::to_value(RiskLevel::Critico).unwrap(), "CRITICO");
        assert_eq!(RiskLevel::Bajo.to_string(), "BAJO");
    }

    #[test]
    fn factor_serializes_as_label() {
        for factor in [
            RiskFactor::HealthData,
            RiskFactor::FinancialData,
            RiskFactor::HighVolume,
            RiskFactor::InternationalTransfer,
            RiskFactor::AutomatedDecisions,
        ] {
            assert_eq!(serde_json::to_value(factor).unwrap(), factor.label());
            let back: RiskFactor = serde_json::from_value(serde_json::json!(factor.label())).unwrap();
            assert_eq!(back, factor);
        }
    }

    #[test]
    fn assessment_factor_labels_keep_order() {
        let a = RiskAssessment {
            level: RiskLevel::Alto,
            score: 55,
            factors: vec![RiskFactor::FinancialData, RiskFactor::InternationalTransfer],
        };
        assert_eq!(
            a.factor_labels(),
            vec!["Datos financieros", "Transferencia internacional de datos"]
        );
        assert!(a.has_factor(RiskFactor::InternationalTransfer));
        assert!(!a.has_factor(RiskFactor::HealthData));
    }
}
