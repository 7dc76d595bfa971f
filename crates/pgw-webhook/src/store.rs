//! # Integration Record Persistence
//!
//! The dispatcher owns record state; a store only provides record-level
//! atomicity for `insert`, `update` by id, and `select` by filter.
//!
//! Status changes go through [`IntegrationStore::transition`], a
//! compare-and-set on [`RecordVersion`]. Two concurrent retries of the same
//! record cannot both leave `ERROR`, and an attempt can only complete a
//! record that is still the `PENDING` version it started from.
//!
//! [`InMemoryIntegrationStore`] is the default backend. The API crate adds a
//! Postgres backend behind the same trait.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use pgw_core::{IntegrationRecord, IntegrationStatus, PartnerType};
use uuid::Uuid;

use crate::error::StoreError;

/// Selection criteria for [`IntegrationStore::select`]. Unset fields match
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationFilter {
    pub partner_type: Option<PartnerType>,
    pub status: Option<IntegrationStatus>,
    pub treatment_id: Option<String>,
    pub limit: Option<usize>,
}

impl IntegrationFilter {
    /// Filter scoped to one partner.
    pub fn for_partner(partner_type: PartnerType) -> Self {
        Self {
            partner_type: Some(partner_type),
            ..Self::default()
        }
    }

    /// Whether a record satisfies every set criterion (ignores `limit`).
    pub fn matches(&self, record: &IntegrationRecord) -> bool {
        self.partner_type
            .as_ref()
            .map_or(true, |p| &record.partner_type == p)
            && self.status.map_or(true, |s| record.status == s)
            && self
                .treatment_id
                .as_deref()
                .map_or(true, |t| record.treatment_id == t)
    }
}

/// The `(status, retry_count)` pair a conditional write expects to find.
///
/// `retry_count` grows on every `ERROR → PENDING`, so the pair changes on
/// every transition and a stale reader can never match it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordVersion {
    pub status: IntegrationStatus,
    pub retry_count: u32,
}

impl RecordVersion {
    pub fn of(record: &IntegrationRecord) -> Self {
        Self {
            status: record.status,
            retry_count: record.retry_count,
        }
    }
}

/// Persistence contract for integration records.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Persist a new record. Fails with [`StoreError::Duplicate`] if the id exists.
    async fn insert(&self, record: &IntegrationRecord) -> Result<(), StoreError>;

    /// Replace the record with the same id. Fails with [`StoreError::NotFound`].
    async fn update(&self, record: &IntegrationRecord) -> Result<(), StoreError>;

    /// Replace the record only if the stored copy is still at `expected`.
    ///
    /// Fails with [`StoreError::Conflict`] when another writer got there
    /// first, or [`StoreError::NotFound`].
    async fn transition(&self, expected: RecordVersion, record: &IntegrationRecord) -> Result<(), StoreError>;

    /// Fetch one record.
    async fn get(&self, id: Uuid) -> Result<Option<IntegrationRecord>, StoreError>;

    /// Records matching `filter`, newest first.
    async fn select(&self, filter: &IntegrationFilter) -> Result<Vec<IntegrationRecord>, StoreError>;

    /// Record counts per status, for the metrics gauge.
    async fn count_by_status(&self) -> Result<HashMap<IntegrationStatus, u64>, StoreError> {
        let mut counts = HashMap::new();
        for record in self.select(&IntegrationFilter::default()).await? {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// Thread-safe in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIntegrationStore {
    records: Arc<RwLock<HashMap<Uuid, IntegrationRecord>>>,
}

impl InMemoryIntegrationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl IntegrationStore for InMemoryIntegrationStore {
    async fn insert(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn update(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        match self.records.write().get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    async fn transition(&self, expected: RecordVersion, record: &IntegrationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write();
        let slot = records.get_mut(&record.id).ok_or(StoreError::NotFound(record.id))?;
        if RecordVersion::of(slot) != expected {
            return Err(StoreError::Conflict(record.id));
        }
        *slot = record.clone();
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntegrationRecord>, StoreError> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn select(&self, filter: &IntegrationFilter) -> Result<Vec<IntegrationRecord>, StoreError> {
        let mut matched: Vec<IntegrationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(partner: &str, treatment: &str) -> IntegrationRecord {
        IntegrationRecord::pending(
            treatment,
            PartnerType::new(partner).unwrap(),
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = InMemoryIntegrationStore::new();
        let r = record("prelafit", "rat-1");
        store.insert(&r).await.unwrap();
        assert!(matches!(store.insert(&r).await, Err(StoreError::Duplicate(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn update_requires_existing_record() {
        let store = InMemoryIntegrationStore::new();
        let mut r = record("prelafit", "rat-1");
        assert!(matches!(store.update(&r).await, Err(StoreError::NotFound(_))));
        store.insert(&r).await.unwrap();
        r.mark_failed("boom", Utc::now()).unwrap();
        store.update(&r).await.unwrap();
        let fetched = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, IntegrationStatus::Error);
    }

    #[tokio::test]
    async fn transition_only_applies_to_expected_version() {
        let store = InMemoryIntegrationStore::new();
        let mut r = record("prelafit", "rat-1");
        r.mark_failed("boom", Utc::now()).unwrap();
        store.insert(&r).await.unwrap();
        let failed = RecordVersion::of(&r);

        let mut first = r.clone();
        first.reopen_for_retry().unwrap();
        store.transition(failed, &first).await.unwrap();

        let mut second = r.clone();
        second.reopen_for_retry().unwrap();
        assert!(matches!(
            store.transition(failed, &second).await,
            Err(StoreError::Conflict(id)) if id == r.id
        ));

        // Back in ERROR with a higher retry_count, the old version still loses.
        let reopened = RecordVersion::of(&first);
        first.mark_failed("again", Utc::now()).unwrap();
        store.transition(reopened, &first).await.unwrap();
        assert!(matches!(
            store.transition(failed, &second).await,
            Err(StoreError::Conflict(_))
        ));

        let stored = store.get(r.id).await.unwrap().unwrap();
        assert_eq!(stored.status, IntegrationStatus::Error);
        assert_eq!(stored.retry_count, 1);

        let missing = record("prelafit", "rat-2");
        assert!(matches!(
            store.transition(RecordVersion::of(&missing), &missing).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn select_filters_and_limits() {
        let store = InMemoryIntegrationStore::new();
        store.insert(&record("prelafit", "rat-1")).await.unwrap();
        store.insert(&record("prelafit", "rat-2")).await.unwrap();
        store.insert(&record("datacompliance", "rat-1")).await.unwrap();

        let prelafit = IntegrationFilter::for_partner(PartnerType::new("prelafit").unwrap());
        assert_eq!(store.select(&prelafit).await.unwrap().len(), 2);

        let by_treatment = IntegrationFilter {
            treatment_id: Some("rat-1".into()),
            ..IntegrationFilter::default()
        };
        assert_eq!(store.select(&by_treatment).await.unwrap().len(), 2);

        let limited = IntegrationFilter {
            limit: Some(1),
            ..IntegrationFilter::default()
        };
        assert_eq!(store.select(&limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn count_by_status_groups_records() {
        let store = InMemoryIntegrationStore::new();
        let mut failed = record("prelafit", "rat-1");
        failed.mark_failed("x", Utc::now()).unwrap();
        store.insert(&failed).await.unwrap();
        store.insert(&record("prelafit", "rat-2")).await.unwrap();
        let counts = store.count_by_status().await.unwrap();
        assert_eq!(counts.get(&IntegrationStatus::Error), Some(&1));
        assert_eq!(counts.get(&IntegrationStatus::Pending), Some(&1));
        assert_eq!(counts.get(&IntegrationStatus::Sent), None);
    }
}
