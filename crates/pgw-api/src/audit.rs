//! # Access Audit Log
//!
//! Append-only log of partner actions. Writing is best-effort: a failed
//! write is logged locally and never fails the request that caused it.
//!
//! Entries are never updated or deleted by the gateway, so [`AuditStore`]
//! exposes only `insert` and `select`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pgw_core::{AuditEntry, CanonicalizationError, PartnerType};
use serde_json::Value;

/// Action names written by the route handlers.
pub mod actions {
    pub const TREATMENT_SUBMITTED: &str = "treatment.submitted";
    pub const RISK_SCORED: &str = "risk.scored";
    pub const INTEGRATIONS_LISTED: &str = "integrations.listed";
    pub const INTEGRATION_VIEWED: &str = "integration.viewed";
    pub const INTEGRATION_RETRIED: &str = "integration.retried";
    pub const AUDIT_VIEWED: &str = "audit.viewed";
    pub const PARTNER_VIEWED: &str = "partner.viewed";
}

/// Errors from audit stores.
#[derive(Debug, thiserror::Error)]
pub enum AuditStoreError {
    #[error("audit store backend error: {0}")]
    Backend(String),
    #[error("audit hash computation failed: {0}")]
    Hash(#[from] CanonicalizationError),
}

/// Selection criteria for [`AuditStore::select`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub partner_type: Option<PartnerType>,
    pub action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.partner_type
            .as_ref()
            .map_or(true, |p| &entry.partner_type == p)
            && self.action.as_deref().map_or(true, |a| entry.action == a)
            && self.since.map_or(true, |s| entry.timestamp >= s)
    }
}

/// Persistence contract for audit entries.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one entry.
    async fn insert(&self, entry: &AuditEntry) -> Result<(), AuditStoreError>;

    /// Entries matching `filter`, newest first.
    async fn select(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditStoreError>;
}

/// In-memory audit store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditStore {
    entries: Arc<RwLock<Vec<AuditEntry>>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), AuditStoreError> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn select(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let entries = self.entries.read();
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Best-effort writer in front of an [`AuditStore`].
#[derive(Clone)]
pub struct AccessAuditLogger {
    store: Arc<dyn AuditStore>,
}

impl std::fmt::Debug for AccessAuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessAuditLogger").finish_non_exhaustive()
    }
}

impl AccessAuditLogger {
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Record an action. Never fails.
    pub async fn log(&self, partner_type: &PartnerType, action: &str, metadata: Value) {
        let entry = AuditEntry::now(partner_type.clone(), action, metadata);
        if let Err(error) = self.store.insert(&entry).await {
            tracing::warn!(
                partner = %partner_type,
                action,
                error = %error,
                "audit log write failed"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FailingStore;

    #[async_trait]
    impl AuditStore for FailingStore {
        async fn insert(&self, _entry: &AuditEntry) -> Result<(), AuditStoreError> {
            Err(AuditStoreError::Backend("disk full".into()))
        }

        async fn select(&self, _filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditStoreError> {
            Err(AuditStoreError::Backend("disk full".into()))
        }
    }

    fn partner(p: &str) -> PartnerType {
        PartnerType::new(p).unwrap()
    }

    #[tokio::test]
    async fn log_appends_entries() {
        let store = InMemoryAuditStore::new();
        let logger = AccessAuditLogger::new(Arc::new(store.clone()));
        logger
            .log(&partner("prelafit"), actions::TREATMENT_SUBMITTED, json!({"treatment_id": "rat-1"}))
            .await;
        logger
            .log(&partner("prelafit"), actions::PARTNER_VIEWED, json!({}))
            .await;
        assert_eq!(store.len(), 2);

        let newest = store.select(&AuditFilter::default()).await.unwrap();
        assert_eq!(newest[0].action, actions::PARTNER_VIEWED);
        assert_eq!(newest[1].metadata["treatment_id"], "rat-1");
    }

    #[tokio::test]
    async fn log_swallows_store_failures() {
        let logger = AccessAuditLogger::new(Arc::new(FailingStore));
        logger
            .log(&partner("prelafit"), actions::AUDIT_VIEWED, json!({}))
            .await;
    }

    #[tokio::test]
    async fn select_filters_by_partner_action_and_limit() {
        let store = InMemoryAuditStore::new();
        for (p, a) in [
            ("prelafit", actions::TREATMENT_SUBMITTED),
            ("prelafit", actions::RISK_SCORED),
            ("datacompliance", actions::TREATMENT_SUBMITTED),
            ("prelafit", actions::TREATMENT_SUBMITTED),
        ] {
            store
                .insert(&AuditEntry::now(partner(p), a, json!({})))
                .await
                .unwrap();
        }

        let filter = AuditFilter {
            partner_type: Some(partner("prelafit")),
            action: Some(actions::TREATMENT_SUBMITTED.into()),
            ..AuditFilter::default()
        };
        assert_eq!(store.select(&filter).await.unwrap().len(), 2);

        let limited = AuditFilter {
            partner_type: Some(partner("prelafit")),
            limit: Some(1),
            ..AuditFilter::default()
        };
        assert_eq!(store.select(&limited).await.unwrap().len(), 1);

        let future = AuditFilter {
            since: Some(Utc::now() + chrono::Duration::hours(1)),
            ..AuditFilter::default()
        };
        assert!(store.select(&future).await.unwrap().is_empty());
    }
}
