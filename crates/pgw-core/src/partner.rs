//! # Partner Identity & Profiles
//!
//! A partner is an external compliance organization consuming the gateway
//! under a tiered contract. Profiles are immutable reference data loaded
//! once at startup; nothing on the request path mutates them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;

/// Feature names a partner may have enabled.
pub mod features {
    /// Submit treatment records for risk scoring.
    pub const RISK_ASSESSMENT: &str = "risk_assessment";
    /// Receive signed `rat_completed` webhooks.
    pub const WEBHOOKS: &str = "webhooks";
    /// Read and retry own integration records.
    pub const INTEGRATIONS: &str = "integrations";
    /// Read own access audit log.
    pub const AUDIT_LOG: &str = "audit_log";

    /// Every feature the gateway recognizes.
    pub const ALL: [&str; 4] = [RISK_ASSESSMENT, WEBHOOKS, INTEGRATIONS, AUDIT_LOG];
}

/// Stable partner identifier, e.g. `"prelafit"` or `"datacompliance"`.
///
/// # Validation
///
/// 1-64 characters of `[a-z0-9_-]`. The identifier appears in rate-limit
/// keys, audit rows, and log fields, so it is kept to a safe alphabet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartnerType(String);

impl PartnerType {
    /// Create a partner type, validating its alphabet and length.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidPartnerType`] for empty, overlong,
    /// or non-slug input.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        let valid = !s.is_empty()
            && s.len() <= 64
            && s
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
        if !valid {
            return Err(ValidationError::InvalidPartnerType(s));
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartnerType {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartnerType> for String {
    fn from(value: PartnerType) -> Self {
        value.0
    }
}

impl std::fmt::Display for PartnerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contract tier of a partner (e.g. `"basic"`, `"premium"`).
///
/// Tiers are free-form so that new contract levels can be introduced in
/// configuration alone; the rate limiter falls back to an explicit default
/// ceiling for tiers it does not recognize. Stored lowercased and trimmed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartnerTier(String);

impl PartnerTier {
    /// Create a tier, normalizing case and surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyTier`] if the input is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into().trim().to_lowercase();
        if s.is_empty() {
            return Err(ValidationError::EmptyTier);
        }
        Ok(Self(s))
    }

    /// Access the tier name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartnerTier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PartnerTier> for String {
    fn from(value: PartnerTier) -> Self {
        value.0
    }
}

impl std::fmt::Display for PartnerTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable description of a partner, resolved from an API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartnerProfile {
    /// Stable partner identifier.
    #[serde(rename = "type")]
    pub partner_type: PartnerType,
    /// Human-readable name shown in dashboards and audit exports.
    pub display_name: String,
    /// Contract tier driving the rate-limit ceiling.
    pub tier: PartnerTier,
    /// Endpoint receiving `rat_completed` webhooks. `None` for read-only
    /// partners that never receive pushes.
    #[serde(default)]
    pub webhook_base_url: Option<Url>,
    /// Whether requests must present an API key.
    #[serde(default = "default_true")]
    pub requires_api_key: bool,
    /// Permanent partners may hold keys without an expiry date.
    #[serde(default)]
    pub is_permanent: bool,
    /// Enabled feature names (see [`features`]).
    #[serde(default)]
    pub enabled_features: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

impl PartnerProfile {
    /// Whether the partner has the given feature enabled.
    pub fn has_feature(&self, feature: &str) -> bool {
        self.enabled_features.contains(feature)
    }

    /// Check structural invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant: blank display name, blank
    /// feature name, or a webhook URL that is not http(s).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.display_name.trim().is_empty() {
            return Err(ValidationError::EmptyDisplayName(
                self.partner_type.to_string(),
            ));
        }
        if self.enabled_features.iter().any(|f| f.trim().is_empty()) {
            return Err(ValidationError::EmptyFeature);
        }
        if let Some(url) = &self.webhook_base_url {
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ValidationError::UnsupportedWebhookScheme {
                    partner: self.partner_type.to_string(),
                    scheme: url.scheme().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PartnerProfile {
        PartnerProfile {
            partner_type: PartnerType::new("prelafit").unwrap(),
            display_name: "Prelafit Compliance".into(),
            tier: PartnerTier::new("premium").unwrap(),
            webhook_base_url: Some("https://hooks.prelafit.cl/rat".parse().unwrap()),
            requires_api_key: true,
            is_permanent: true,
            enabled_features: [features::RISK_ASSESSMENT, features::WEBHOOKS]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    #[test]
    fn partner_type_accepts_slugs() {
        assert_eq!(PartnerType::new("data-compliance_2").unwrap().as_str(), "data-compliance_2");
    }

    #[test]
    fn partner_type_rejects_bad_input() {
        assert!(PartnerType::new("").is_err());
        assert!(PartnerType::new("Prelafit").is_err());
        assert!(PartnerType::new("has space").is_err());
        assert!(PartnerType::new("x".repeat(65)).is_err());
    }

    #[test]
    fn partner_type_deserialization_validates() {
        let ok: Result<PartnerType, _> = serde_json::from_str("\"prelafit\"");
        assert!(ok.is_ok());
        let bad: Result<PartnerType, _> = serde_json::from_str("\"NOPE!\"");
        assert!(bad.is_err());
    }

    #[test]
    fn tier_is_normalized() {
        assert_eq!(PartnerTier::new("  Premium ").unwrap().as_str(), "premium");
        assert_eq!(PartnerTier::new(" "), Err(ValidationError::EmptyTier));
    }

    #[test]
    fn has_feature_checks_membership() {
        let p = profile();
        assert!(p.has_feature(features::WEBHOOKS));
        assert!(!p.has_feature(features::AUDIT_LOG));
    }

    #[test]
    fn validate_rejects_non_http_webhook() {
        let mut p = profile();
        p.webhook_base_url = Some("ftp://files.prelafit.cl".parse().unwrap());
        assert!(matches!(
            p.validate(),
            Err(ValidationError::UnsupportedWebhookScheme { .. })
        ));
    }

    #[test]
    fn validate_rejects_blank_display_name() {
        let mut p = profile();
        p.display_name = "  ".into();
        assert!(p.validate().is_err());
        assert!(profile().validate().is_ok());
    }

    #[test]
    fn profile_serializes_type_field() {
        let json = serde_json::to_value(profile()).unwrap();
        assert_eq!(json["type"], "prelafit");
        assert_eq!(json["tier"], "premium");
        assert_eq!(json["is_permanent"], true);
    }
}
