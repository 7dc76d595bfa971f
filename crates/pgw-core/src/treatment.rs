//! # Treatment Descriptions
//!
//! The slice of a RAT (registro de actividades de tratamiento) that drives
//! risk scoring. The full RAT payload travels alongside as opaque JSON; only
//! these fields are interpreted by the gateway.

use serde::{Deserialize, Serialize};

/// Category of personal data involved in a treatment.
///
/// Spanish aliases are accepted on input because partner forms are filled
/// in Spanish; output always uses the English snake_case names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCategory {
    /// Medical and health data (sensitive).
    #[serde(alias = "medical", alias = "salud")]
    Health,
    /// Bank, card, income, or credit data.
    #[serde(alias = "financiero", alias = "financieros")]
    Financial,
    /// National ID numbers (RUT), names, birth dates.
    #[serde(alias = "identificacion")]
    Identification,
    /// Addresses, phone numbers, email.
    #[serde(alias = "contacto")]
    Contact,
    /// Fingerprints, facial geometry, and similar.
    #[serde(alias = "biometricos")]
    Biometric,
    /// Geolocation traces.
    #[serde(alias = "ubicacion")]
    Location,
    /// Employment history and HR records.
    #[serde(alias = "laborales")]
    Employment,
    /// Academic records.
    #[serde(alias = "educacionales")]
    Education,
}

/// Input to the risk scoring engine, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentDescription {
    /// Categories of personal data processed.
    #[serde(default)]
    pub categories: Vec<DataCategory>,
    /// Number of data subjects affected.
    #[serde(default)]
    pub subject_count: u64,
    /// Data leaves the country.
    #[serde(default)]
    pub international_transfer: bool,
    /// Decisions are taken without human intervention.
    #[serde(default)]
    pub automated_decisions: bool,
}

impl TreatmentDescription {
    /// Whether the treatment involves the given category.
    pub fn includes(&self, category: DataCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_aliases_deserialize() {
        let t: TreatmentDescription = serde_json::from_value(serde_json::json!({
            "categories": ["salud", "financiero", "medical"],
            "subject_count": 12,
        }))
        .unwrap();
        assert_eq!(
            t.categories,
            vec![DataCategory::Health, DataCategory::Financial, DataCategory::Health]
        );
        assert!(!t.international_transfer);
        assert!(!t.automated_decisions);
    }

    #[test]
    fn unknown_category_is_rejected() {
        let result: Result<TreatmentDescription, _> = serde_json::from_value(serde_json::json!({
            "categories": ["astrology"],
        }));
        assert!(result.is_err());
    }

    #[test]
    fn includes_checks_membership() {
        let t = TreatmentDescription {
            categories: vec![DataCategory::Contact],
            subject_count: 0,
            international_transfer: false,
            automated_decisions: false,
        };
        assert!(t.includes(DataCategory::Contact));
        assert!(!t.includes(DataCategory::Health));
    }
}
