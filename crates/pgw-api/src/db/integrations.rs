//! Integration record persistence.
//!
//! Implements [`IntegrationStore`] on the `integration_records` table. Each
//! operation is a single statement, which gives record-level atomicity.
//! `transition` adds the expected `(status, retry_count)` to the `WHERE`
//! clause so a stale writer matches no row.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgw_core::{IntegrationRecord, IntegrationStatus, PartnerType};
use pgw_webhook::{IntegrationFilter, IntegrationStore, RecordVersion, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

const UNIQUE_VIOLATION: &str = "23505";

/// Postgres-backed [`IntegrationStore`].
#[derive(Debug, Clone)]
pub struct PgIntegrationStore {
    pool: PgPool,
}

impl PgIntegrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn retry_count_to_db(count: u32) -> Result<i32, StoreError> {
    i32::try_from(count).map_err(|_| StoreError::Backend(format!("retry_count {count} out of range")))
}

#[async_trait]
impl IntegrationStore for PgIntegrationStore {
    async fn insert(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO integration_records (id, treatment_id, partner_type, status, payload,
             response_body, error_message, retry_count, created_at, last_attempt_at, success_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(record.id)
        .bind(&record.treatment_id)
        .bind(record.partner_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(&record.response_body)
        .bind(&record.error_message)
        .bind(retry_count_to_db(record.retry_count)?)
        .bind(record.created_at)
        .bind(record.last_attempt_at)
        .bind(record.success_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Err(StoreError::Duplicate(record.id))
            }
            Err(e) => Err(backend(e)),
        }
    }

    async fn update(&self, record: &IntegrationRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE integration_records SET status = $1, payload = $2, response_body = $3,
             error_message = $4, retry_count = $5, last_attempt_at = $6, success_at = $7
             WHERE id = $8",
        )
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(&record.response_body)
        .bind(&record.error_message)
        .bind(retry_count_to_db(record.retry_count)?)
        .bind(record.last_attempt_at)
        .bind(record.success_at)
        .bind(record.id)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(record.id));
        }
        Ok(())
    }

    async fn transition(&self, expected: RecordVersion, record: &IntegrationRecord) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE integration_records SET status = $1, payload = $2, response_body = $3,
             error_message = $4, retry_count = $5, last_attempt_at = $6, success_at = $7
             WHERE id = $8 AND status = $9 AND retry_count = $10",
        )
        .bind(record.status.as_str())
        .bind(&record.payload)
        .bind(&record.response_body)
        .bind(&record.error_message)
        .bind(retry_count_to_db(record.retry_count)?)
        .bind(record.last_attempt_at)
        .bind(record.success_at)
        .bind(record.id)
        .bind(expected.status.as_str())
        .bind(retry_count_to_db(expected.retry_count)?)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM integration_records WHERE id = $1)")
                .bind(record.id)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        if exists {
            Err(StoreError::Conflict(record.id))
        } else {
            Err(StoreError::NotFound(record.id))
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<IntegrationRecord>, StoreError> {
        let row = sqlx::query_as::<_, IntegrationRow>(
            "SELECT id, treatment_id, partner_type, status, payload, response_body,
             error_message, retry_count, created_at, last_attempt_at, success_at
             FROM integration_records WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(IntegrationRecord::try_from).transpose()
    }

    async fn select(&self, filter: &IntegrationFilter) -> Result<Vec<IntegrationRecord>, StoreError> {
        let limit = filter
            .limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let rows = sqlx::query_as::<_, IntegrationRow>(
            "SELECT id, treatment_id, partner_type, status, payload, response_body,
             error_message, retry_count, created_at, last_attempt_at, success_at
             FROM integration_records
             WHERE ($1::text IS NULL OR partner_type = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR treatment_id = $3)
             ORDER BY created_at DESC, id DESC
             LIMIT $4",
        )
        .bind(filter.partner_type.as_ref().map(|p| p.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.treatment_id.as_deref())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(IntegrationRecord::try_from).collect()
    }

    async fn count_by_status(&self) -> Result<HashMap<IntegrationStatus, u64>, StoreError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM integration_records GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        let mut counts = HashMap::new();
        for (status, count) in rows {
            let status = status.parse::<IntegrationStatus>().map_err(StoreError::Backend)?;
            counts.insert(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(counts)
    }
}

/// Database row for integration records.
#[derive(sqlx::FromRow)]
struct IntegrationRow {
    id: Uuid,
    treatment_id: String,
    partner_type: String,
    status: String,
    payload: serde_json::Value,
    response_body: Option<String>,
    error_message: Option<String>,
    retry_count: i32,
    created_at: DateTime<Utc>,
    last_attempt_at: Option<DateTime<Utc>>,
    success_at: Option<DateTime<Utc>>,
}

impl TryFrom<IntegrationRow> for IntegrationRecord {
    type Error = StoreError;

    fn try_from(row: IntegrationRow) -> Result<Self, Self::Error> {
        let partner_type = PartnerType::new(row.partner_type)
            .map_err(|e| StoreError::Backend(format!("row {}: {e}", row.id)))?;
        let status = row
            .status
            .parse::<IntegrationStatus>()
            .map_err(|e| StoreError::Backend(format!("row {}: {e}", row.id)))?;
        let retry_count = u32::try_from(row.retry_count)
            .map_err(|_| StoreError::Backend(format!("row {}: negative retry_count", row.id)))?;

        Ok(IntegrationRecord {
            id: row.id,
            treatment_id: row.treatment_id,
            partner_type,
            status,
            payload: row.payload,
            response_body: row.response_body,
            error_message: row.error_message,
            retry_count,
            created_at: row.created_at,
            last_attempt_at: row.last_attempt_at,
            success_at: row.success_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str, retry_count: i32) -> IntegrationRow {
        IntegrationRow {
            id: Uuid::new_v4(),
            treatment_id: "rat-7".into(),
            partner_type: "prelafit".into(),
            status: status.into(),
            payload: serde_json::json!({"event": "rat_completed"}),
            response_body: None,
            error_message: Some("503".into()),
            retry_count,
            created_at: Utc::now(),
            last_attempt_at: Some(Utc::now()),
            success_at: None,
        }
    }

    #[test]
    fn row_converts_to_record() {
        let record = IntegrationRecord::try_from(row("ERROR", 2)).unwrap();
        assert_eq!(record.status, IntegrationStatus::Error);
        assert_eq!(record.retry_count, 2);
        assert_eq!(record.partner_type.as_str(), "prelafit");
    }

    #[test]
    fn corrupt_rows_are_backend_errors() {
        assert!(matches!(
            IntegrationRecord::try_from(row("DELIVERED", 0)),
            Err(StoreError::Backend(_))
        ));
        assert!(matches!(
            IntegrationRecord::try_from(row("SENT", -1)),
            Err(StoreError::Backend(_))
        ));
    }
}
