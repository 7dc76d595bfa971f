//! # Access Audit Entries
//!
//! Append-only records of partner actions. Persistent stores chain entries
//! with SHA-256 so that a deleted or edited row breaks every later hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::canonical::CanonicalBytes;
use crate::error::CanonicalizationError;
use crate::partner::PartnerType;

/// Previous-hash value of the first entry in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// A single partner action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Acting partner.
    pub partner_type: PartnerType,
    /// Action name, e.g. `"treatment.submitted"`.
    pub action: String,
    /// Free-form context. Never contains API keys or webhook secrets.
    pub metadata: Value,
    /// When the action happened.
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Create an entry stamped with the current time.
    pub fn now(partner_type: PartnerType, action: impl Into<String>, metadata: Value) -> Self {
        Self {
            partner_type,
            action: action.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Hash linking this entry to `previous_hash`.
    ///
    /// `SHA-256(prev | partner | action | timestamp_micros | canonical(metadata))`
    /// rendered as lowercase hex.
    pub fn chain_hash(&self, previous_hash: &str) -> Result<String, CanonicalizationError> {
        let metadata = CanonicalBytes::from_value(&self.metadata)?;
        let mut hasher = Sha256::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(b"|");
        hasher.update(self.partner_type.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.action.as_bytes());
        hasher.update(b"|");
        hasher.update(self.timestamp.timestamp_micros().to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(metadata.as_bytes());
        Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(action: &str) -> AuditEntry {
        AuditEntry {
            partner_type: PartnerType::new("datacompliance").unwrap(),
            action: action.into(),
            metadata: json!({"treatment_id": "rat-9", "level": "ALTO"}),
            timestamp: DateTime::parse_from_rfc3339("2026-02-10T12:00:00.123456Z")
                .unwrap()
                .with_timezone(&Utc),
        }
    }

    #[test]
    fn chain_hash_is_hex_sha256() {
        let h = entry("treatment.submitted").chain_hash(GENESIS_HASH).unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn chain_hash_depends_on_previous_hash() {
        let e = entry("treatment.submitted");
        let a = e.chain_hash(GENESIS_HASH).unwrap();
        let b = e.chain_hash(&a).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, e.chain_hash(GENESIS_HASH).unwrap());
    }

    #[test]
    fn chain_hash_depends_on_content() {
        let a = entry("treatment.submitted").chain_hash(GENESIS_HASH).unwrap();
        let b = entry("integration.retried").chain_hash(GENESIS_HASH).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn metadata_key_order_does_not_change_hash() {
        let mut e = entry("x");
        let a = e.chain_hash(GENESIS_HASH).unwrap();
        e.metadata = json!({"level": "ALTO", "treatment_id": "rat-9"});
        assert_eq!(a, e.chain_hash(GENESIS_HASH).unwrap());
    }
}
