//! # Audit Log API
//!
//! A partner's own access history. Entries of other partners are never
//! returned.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pgw_core::{features, AuditEntry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

use crate::audit::{actions, AuditFilter};
use crate::auth::{require_feature, AuthenticatedPartner};
use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditQuery {
    /// Exact action name, e.g. `treatment.submitted`.
    pub action: Option<String>,
    /// Only entries at or after this instant (RFC 3339).
    pub since: Option<DateTime<Utc>>,
    /// Page size, default 100, at most 1000.
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditEntryView {
    pub action: String,
    #[schema(value_type = Object)]
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl From<AuditEntry> for AuditEntryView {
    fn from(e: AuditEntry) -> Self {
        Self {
            action: e.action,
            metadata: e.metadata,
            timestamp: e.timestamp,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditListResponse {
    pub count: usize,
    pub entries: Vec<AuditEntryView>,
}

/// Build the audit router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/audit", get(list_audit))
}

/// GET /v1/audit: The caller's audit entries, newest first.
#[utoipa::path(
    get,
    path = "/v1/audit",
    params(AuditQuery),
    responses(
        (status = 200, description = "Audit entries", body = AuditListResponse),
        (status = 403, description = "audit_log feature disabled", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub async fn list_audit(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    query: Result<Query<AuditQuery>, QueryRejection>,
) -> Result<Json<AuditListResponse>, AppError> {
    require_feature(&partner, features::AUDIT_LOG)?;
    let Query(query) = query.map_err(|err| AppError::BadRequest(err.body_text()))?;

    let filter = AuditFilter {
        partner_type: Some(partner.partner_type().clone()),
        action: query.action,
        since: query.since,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
    };
    let entries = state.audit.store().select(&filter).await?;

    // Logged after the read so the listing does not include itself.
    state
        .audit
        .log(
            partner.partner_type(),
            actions::AUDIT_VIEWED,
            json!({ "count": entries.len(), "action": filter.action }),
        )
        .await;

    let entries: Vec<AuditEntryView> = entries.into_iter().map(Into::into).collect();
    Ok(Json(AuditListResponse {
        count: entries.len(),
        entries,
    }))
}
