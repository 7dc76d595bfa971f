//! # Integration Records API
//!
//! Read access to the caller's own webhook deliveries and the explicit
//! retry operation. Records of other partners are reported as not found.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pgw_core::{features, IntegrationRecord, IntegrationStatus, PartnerType};
use pgw_webhook::{DispatchError, IntegrationFilter};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::audit::actions;
use crate::auth::{require_feature, AuthenticatedPartner};
use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// Outcome of a webhook delivery as reported to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Error,
    Pending,
    /// No delivery was attempted.
    Skipped,
}

impl From<IntegrationStatus> for DeliveryStatus {
    fn from(status: IntegrationStatus) -> Self {
        match status {
            IntegrationStatus::Sent => Self::Sent,
            IntegrationStatus::Error => Self::Error,
            IntegrationStatus::Pending => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeliveryOutcome {
    pub status: DeliveryStatus,
    pub integration_id: Option<Uuid>,
    pub retry_count: Option<u32>,
    /// Failure message of the attempt, or why delivery was skipped.
    pub detail: Option<String>,
}

impl DeliveryOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: DeliveryStatus::Skipped,
            integration_id: None,
            retry_count: None,
            detail: Some(reason.into()),
        }
    }

    fn from_record(record: &IntegrationRecord) -> Self {
        Self {
            status: record.status.into(),
            integration_id: Some(record.id),
            retry_count: Some(record.retry_count),
            detail: record.error_message.clone(),
        }
    }
}

/// Turn a dispatch result into a reportable outcome.
///
/// A failed attempt is a normal outcome: the record is already persisted in
/// `ERROR` and the caller learns about it in the response body. Any other
/// dispatch error is an [`AppError`].
pub(crate) fn delivery_outcome(
    state: &AppState,
    partner: &PartnerType,
    result: Result<IntegrationRecord, DispatchError>,
) -> Result<DeliveryOutcome, AppError> {
    match result {
        Ok(record) => {
            state.metrics.record_webhook(partner.as_str(), "sent");
            Ok(DeliveryOutcome::from_record(&record))
        }
        Err(DispatchError::Delivery { record, source }) => {
            state.metrics.record_webhook(partner.as_str(), source.kind());
            tracing::warn!(
                partner = %partner,
                integration_id = %record.id,
                retry_count = record.retry_count,
                error = %source,
                "webhook delivery failed"
            );
            Ok(DeliveryOutcome::from_record(&record))
        }
        Err(other) => Err(other.into()),
    }
}

/// An integration record as returned to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IntegrationView {
    pub id: Uuid,
    pub treatment_id: String,
    pub partner_type: String,
    /// `PENDING`, `SENT` or `ERROR`.
    pub status: String,
    /// Webhook payload exactly as signed.
    #[schema(value_type = Object)]
    pub payload: Value,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub success_at: Option<DateTime<Utc>>,
}

impl From<IntegrationRecord> for IntegrationView {
    fn from(r: IntegrationRecord) -> Self {
        Self {
            id: r.id,
            treatment_id: r.treatment_id,
            partner_type: r.partner_type.as_str().to_string(),
            status: r.status.as_str().to_string(),
            payload: r.payload,
            response_body: r.response_body,
            error_message: r.error_message,
            retry_count: r.retry_count,
            created_at: r.created_at,
            last_attempt_at: r.last_attempt_at,
            success_at: r.success_at,
        }
    }
}

/// Filters for listing integrations.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListIntegrationsQuery {
    /// `PENDING`, `SENT` or `ERROR` (case-insensitive).
    pub status: Option<String>,
    pub treatment_id: Option<String>,
    /// Page size, default 50, at most 500.
    pub limit: Option<usize>,
}

impl ListIntegrationsQuery {
    fn into_filter(self, partner: PartnerType) -> Result<IntegrationFilter, AppError> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<IntegrationStatus>)
            .transpose()
            .map_err(AppError::Validation)?;
        Ok(IntegrationFilter {
            status,
            treatment_id: self.treatment_id,
            limit: Some(self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)),
            ..IntegrationFilter::for_partner(partner)
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IntegrationListResponse {
    pub count: usize,
    pub integrations: Vec<IntegrationView>,
}

/// Build the integrations router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/integrations", get(list_integrations))
        .route("/v1/integrations/:id", get(get_integration))
        .route("/v1/integrations/:id/retry", post(retry_integration))
}

fn extract_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    path.map(|Path(id)| id)
        .map_err(|err| AppError::BadRequest(err.body_text()))
}

/// GET /v1/integrations: List the caller's integration records, newest first.
#[utoipa::path(
    get,
    path = "/v1/integrations",
    params(ListIntegrationsQuery),
    responses(
        (status = 200, description = "Integration records", body = IntegrationListResponse),
        (status = 403, description = "integrations feature disabled", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown status filter", body = crate::error::ErrorBody),
    ),
    tag = "integrations"
)]
pub async fn list_integrations(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    query: Result<Query<ListIntegrationsQuery>, QueryRejection>,
) -> Result<Json<IntegrationListResponse>, AppError> {
    require_feature(&partner, features::INTEGRATIONS)?;
    let Query(query) = query.map_err(|err| AppError::BadRequest(err.body_text()))?;
    let filter = query.into_filter(partner.partner_type().clone())?;

    let records = state.integrations().select(&filter).await?;

    state
        .audit
        .log(
            partner.partner_type(),
            actions::INTEGRATIONS_LISTED,
            json!({
                "count": records.len(),
                "status": filter.status.map(|s| s.as_str()),
                "treatment_id": filter.treatment_id,
            }),
        )
        .await;

    let integrations: Vec<IntegrationView> = records.into_iter().map(Into::into).collect();
    Ok(Json(IntegrationListResponse {
        count: integrations.len(),
        integrations,
    }))
}

/// GET /v1/integrations/:id: One of the caller's integration records.
#[utoipa::path(
    get,
    path = "/v1/integrations/{id}",
    params(("id" = Uuid, Path, description = "Integration record ID")),
    responses(
        (status = 200, description = "Integration record", body = IntegrationView),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "integrations"
)]
pub async fn get_integration(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<IntegrationView>, AppError> {
    require_feature(&partner, features::INTEGRATIONS)?;
    let id = extract_id(path)?;

    let record = state
        .integrations()
        .get(id)
        .await?
        .filter(|r| &r.partner_type == partner.partner_type())
        .ok_or_else(|| AppError::NotFound(format!("integración {id} no encontrada")))?;

    state
        .audit
        .log(
            partner.partner_type(),
            actions::INTEGRATION_VIEWED,
            json!({ "integration_id": id, "status": record.status.as_str() }),
        )
        .await;

    Ok(Json(record.into()))
}

/// POST /v1/integrations/:id/retry: Re-attempt a failed delivery.
#[utoipa::path(
    post,
    path = "/v1/integrations/{id}/retry",
    params(("id" = Uuid, Path, description = "Integration record ID")),
    responses(
        (status = 200, description = "Retry outcome; a failed attempt reports status ERROR", body = DeliveryOutcome),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Record is not in ERROR or partner has no webhook", body = crate::error::ErrorBody),
    ),
    tag = "integrations"
)]
pub async fn retry_integration(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeliveryOutcome>, AppError> {
    require_feature(&partner, features::INTEGRATIONS)?;
    require_feature(&partner, features::WEBHOOKS)?;
    let id = extract_id(path)?;

    let target = state.webhook_target(partner.partner_type()).ok_or_else(|| {
        AppError::Conflict("el partner no tiene un webhook configurado".into())
    })?;

    let result = state.dispatcher.retry(target, id).await;
    let outcome = delivery_outcome(&state, partner.partner_type(), result)?;

    state
        .audit
        .log(
            partner.partner_type(),
            actions::INTEGRATION_RETRIED,
            json!({
                "integration_id": id,
                "status": outcome.status,
                "retry_count": outcome.retry_count,
            }),
        )
        .await;

    Ok(Json(outcome))
}
