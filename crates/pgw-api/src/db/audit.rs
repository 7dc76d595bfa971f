//! Access audit persistence with an immutable hash chain.
//!
//! Every appended entry stores the hash of the entry before it and its own
//! [`AuditEntry::chain_hash`]. Appends serialize on a transaction-scoped
//! advisory lock so two writers never read the same chain head.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgw_core::{AuditEntry, PartnerType, GENESIS_HASH};
use sqlx::PgPool;

use crate::audit::{AuditFilter, AuditStore, AuditStoreError};

/// Advisory lock key guarding the head of the `access_audit` chain.
const CHAIN_LOCK_KEY: i64 = 0x7067_775f_6175_6474;

/// Postgres-backed [`AuditStore`].
#[derive(Debug, Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

fn backend(err: sqlx::Error) -> AuditStoreError {
    AuditStoreError::Backend(err.to_string())
}

impl PgAuditStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Walk the oldest `limit` entries and recompute every link.
    ///
    /// A broken link is a row whose `previous_hash` differs from the stored
    /// hash of the row before it. A tampered entry is a row whose stored
    /// hash no longer matches its content.
    pub async fn verify_chain(&self, limit: i64) -> Result<ChainIntegrityResult, AuditStoreError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT seq, partner_type, action, metadata, occurred_at, previous_hash, event_hash
             FROM access_audit ORDER BY seq ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(verify_rows(&rows))
    }
}

fn verify_rows(rows: &[AuditRow]) -> ChainIntegrityResult {
    let mut broken_links = 0;
    let mut tampered_entries = Vec::new();
    let mut last_hash: Option<&str> = None;

    for row in rows {
        if let Some(expected_prev) = last_hash {
            if row.previous_hash != expected_prev {
                broken_links += 1;
            }
        }
        let recomputed = row
            .to_entry()
            .ok()
            .and_then(|entry| entry.chain_hash(&row.previous_hash).ok());
        if recomputed.as_deref() != Some(row.event_hash.as_str()) {
            tampered_entries.push(row.seq);
        }
        last_hash = Some(&row.event_hash);
    }

    ChainIntegrityResult {
        total_entries: rows.len(),
        broken_links,
        chain_valid: broken_links == 0 && tampered_entries.is_empty(),
        tampered_entries,
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn insert(&self, entry: &AuditEntry) -> Result<(), AuditStoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(CHAIN_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let previous_hash: Option<String> =
            sqlx::query_scalar("SELECT event_hash FROM access_audit ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend)?;
        let prev = previous_hash.as_deref().unwrap_or(GENESIS_HASH);
        let event_hash = entry.chain_hash(prev)?;

        sqlx::query(
            "INSERT INTO access_audit (partner_type, action, metadata, occurred_at,
             previous_hash, event_hash)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(entry.partner_type.as_str())
        .bind(&entry.action)
        .bind(&entry.metadata)
        .bind(entry.timestamp)
        .bind(prev)
        .bind(&event_hash)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn select(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>, AuditStoreError> {
        let limit = filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, AuditRow>(
            "SELECT seq, partner_type, action, metadata, occurred_at, previous_hash, event_hash
             FROM access_audit
             WHERE ($1::text IS NULL OR partner_type = $1)
               AND ($2::text IS NULL OR action = $2)
               AND ($3::timestamptz IS NULL OR occurred_at >= $3)
             ORDER BY seq DESC
             LIMIT $4",
        )
        .bind(filter.partner_type.as_ref().map(|p| p.as_str()))
        .bind(filter.action.as_deref())
        .bind(filter.since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter().map(AuditRow::to_entry).collect()
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChainIntegrityResult {
    pub total_entries: usize,
    pub broken_links: usize,
    /// `seq` of every row whose stored hash does not match its content.
    pub tampered_entries: Vec<i64>,
    pub chain_valid: bool,
}

/// Database row for audit entries.
#[derive(sqlx::FromRow)]
struct AuditRow {
    seq: i64,
    partner_type: String,
    action: String,
    metadata: serde_json::Value,
    occurred_at: DateTime<Utc>,
    previous_hash: String,
    event_hash: String,
}

impl AuditRow {
    fn to_entry(&self) -> Result<AuditEntry, AuditStoreError> {
        let partner_type = PartnerType::new(self.partner_type.clone())
            .map_err(|e| AuditStoreError::Backend(format!("audit row {}: {e}", self.seq)))?;
        Ok(AuditEntry {
            partner_type,
            action: self.action.clone(),
            metadata: self.metadata.clone(),
            timestamp: self.occurred_at,
        })
    }
}
