//! # Risk Scoring Engine
//!
//! Maps a [`TreatmentDescription`] to a weighted [`RiskAssessment`].
//!
//! | Factor                    | Trigger                         | Weight |
//! |---------------------------|---------------------------------|--------|
//! | Sensitive health data     | categories include health       | +40    |
//! | Financial data            | categories include financial    | +30    |
//! | High subject volume       | subject count > 10,000          | +20    |
//! | International transfer    | flag set                        | +25    |
//! | Automated decision-making | flag set                        | +15    |
//!
//! Factors are evaluated and appended in the row order above. Each factor
//! contributes at most once, no matter how often its category repeats.

use pgw_core::{DataCategory, RiskAssessment, RiskFactor, RiskLevel, TreatmentDescription};
use serde::{Deserialize, Serialize};

/// Weight contributed by each risk factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    /// Sensitive health data.
    pub health_data: u32,
    /// Financial data.
    pub financial_data: u32,
    /// International transfer.
    pub international_transfer: u32,
    /// Subject volume above [`RiskWeights::high_volume_threshold`].
    pub high_volume: u32,
    /// Automated decision-making.
    pub automated_decisions: u32,
    /// Subject count that must be exceeded for the volume factor.
    pub high_volume_threshold: u64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            health_data: 40,
            financial_data: 30,
            international_transfer: 25,
            high_volume: 20,
            automated_decisions: 15,
            high_volume_threshold: 10_000,
        }
    }
}

/// Lower score bounds (inclusive) of each level above `BAJO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    /// Minimum score for `CRITICO`.
    pub critical: u32,
    /// Minimum score for `ALTO`.
    pub high: u32,
    /// Minimum score for `MEDIO`.
    pub medium: u32,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical: 70,
            high: 40,
            medium: 20,
        }
    }
}

impl RiskThresholds {
    /// Level for a score.
    pub fn level_for(&self, score: u32) -> RiskLevel {
        if score >= self.critical {
            RiskLevel::Critico
        } else if score >= self.high {
            RiskLevel::Alto
        } else if score >= self.medium {
            RiskLevel::Medio
        } else {
            RiskLevel::Bajo
        }
    }
}

/// Complete scoring configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Factor weights.
    pub weights: RiskWeights,
    /// Level thresholds.
    pub thresholds: RiskThresholds,
}

/// Pure risk scoring. Holds only configuration, so it is `Copy` and can be
/// shared freely between request handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskScoringEngine {
    config: ScoringConfig,
}

impl RiskScoringEngine {
    /// Create an engine with the given configuration.
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score a treatment.
    pub fn score(&self, treatment: &TreatmentDescription) -> RiskAssessment {
        let w = &self.config.weights;
        let triggered = [
            (treatment.includes(DataCategory::Health), RiskFactor::HealthData, w.health_data),
            (
                treatment.includes(DataCategory::Financial),
                RiskFactor::FinancialData,
                w.financial_data,
            ),
            (
                treatment.subject_count > w.high_volume_threshold,
                RiskFactor::HighVolume,
                w.high_volume,
            ),
            (
                treatment.international_transfer,
                RiskFactor::InternationalTransfer,
                w.international_transfer,
            ),
            (
                treatment.automated_decisions,
                RiskFactor::AutomatedDecisions,
                w.automated_decisions,
            ),
        ];

        let mut score: u32 = 0;
        let mut factors = Vec::new();
        for (applies, factor, weight) in triggered {
            if applies {
                score = score.saturating_add(weight);
                factors.push(factor);
            }
        }

        let level = self.config.thresholds.level_for(score);
        tracing::debug!(score, level = %level, factors = factors.len(), "treatment scored");
        RiskAssessment {
            level,
            score,
            factors,
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn category() -> impl Strategy<Value = DataCategory> {
        prop_oneof![
            Just(DataCategory::Health),
            Just(DataCategory::Financial),
            Just(DataCategory::Identification),
            Just(DataCategory::Contact),
            Just(DataCategory::Biometric),
            Just(DataCategory::Location),
            Just(DataCategory::Employment),
            Just(DataCategory::Education),
        ]
    }

    fn treatment() -> impl Strategy<Value = TreatmentDescription> {
        (
            prop::collection::vec(category(), 0..10),
            0u64..100_000,
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(categories, subject_count, international_transfer, automated_decisions)| {
                TreatmentDescription {
                    categories,
                    subject_count,
                    international_transfer,
                    automated_decisions,
                }
            })
    }

    proptest! {
        /// Scoring the same treatment twice gives the same score, level, and factor order.
        #[test]
        fn scoring_is_deterministic(t in treatment()) {
            let engine = RiskScoringEngine::default();
            prop_assert_eq!(engine.score(&t), engine.score(&t));
        }

        /// The score is the sum of the weights of the reported factors.
        #[test]
        fn score_equals_sum_of_factor_weights(t in treatment()) {
            let engine = RiskScoringEngine::default();
            let w = engine.config().weights;
            let a = engine.score(&t);
            let expected: u32 = a.factors.iter().map(|f| match f {
                RiskFactor::HealthData => w.health_data,
                RiskFactor::FinancialData => w.financial_data,
                RiskFactor::HighVolume => w.high_volume,
                RiskFactor::InternationalTransfer => w.international_transfer,
                RiskFactor::AutomatedDecisions => w.automated_decisions,
            }).sum();
            prop_assert_eq!(a.score, expected);
            prop_assert!(a.factors.len() <= 5);
        }

        /// Adding a factor never lowers the level.
        #[test]
        fn level_is_monotonic_in_flags(t in treatment()) {
            let engine = RiskScoringEngine::default();
            let base = engine.score(&t);
            let mut more = t.clone();
            more.international_transfer = true;
            more.automated_decisions = true;
            more.categories.push(DataCategory::Health);
            prop_assert!(engine.score(&more).level >= base.level);
        }
    }
}
