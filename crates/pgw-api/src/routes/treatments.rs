//! # Treatment Submission API
//!
//! The write path. A completed RAT is scored, its required documents are
//! resolved, and a signed `rat_completed` webhook is delivered to the
//! submitting partner when it has the `webhooks` feature and an endpoint.
//!
//! A failed delivery does not fail the request: the response reports
//! `delivery.status = "ERROR"` with the integration id to retry.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use pgw_core::{features, TreatmentDescription};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::audit::actions;
use crate::auth::{require_feature, AuthenticatedPartner};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::routes::integrations::{delivery_outcome, DeliveryOutcome};
use crate::routes::risk::{DocumentView, RiskView};
use crate::state::AppState;

const MAX_TREATMENT_ID_LEN: usize = 128;

/// A completed treatment record.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitTreatmentRequest {
    /// Caller's identifier for the RAT.
    pub treatment_id: String,
    /// Fields that drive the risk score.
    #[schema(value_type = Object)]
    pub treatment: TreatmentDescription,
    /// Full RAT, forwarded to the partner webhook untouched.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub rat: Value,
}

impl Validate for SubmitTreatmentRequest {
    fn validate(&self) -> Result<(), String> {
        let id = self.treatment_id.trim();
        if id.is_empty() {
            return Err("treatment_id no puede estar vacío".into());
        }
        if id.len() > MAX_TREATMENT_ID_LEN {
            return Err(format!(
                "treatment_id excede {MAX_TREATMENT_ID_LEN} caracteres"
            ));
        }
        if !(self.rat.is_null() || self.rat.is_object()) {
            return Err("rat debe ser un objeto JSON".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TreatmentResponse {
    pub treatment_id: String,
    pub risk: RiskView,
    pub required_documents: Vec<DocumentView>,
    pub delivery: DeliveryOutcome,
}

/// Build the treatments router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/treatments", post(submit_treatment))
}

/// POST /v1/treatments: Score a completed RAT and notify the partner.
#[utoipa::path(
    post,
    path = "/v1/treatments",
    request_body = SubmitTreatmentRequest,
    responses(
        (status = 200, description = "Assessment and delivery outcome", body = TreatmentResponse),
        (status = 400, description = "Malformed body", body = crate::error::ErrorBody),
        (status = 403, description = "risk_assessment feature disabled", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "treatments"
)]
pub async fn submit_treatment(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    body: Result<Json<SubmitTreatmentRequest>, JsonRejection>,
) -> Result<Json<TreatmentResponse>, AppError> {
    require_feature(&partner, features::RISK_ASSESSMENT)?;
    let req = extract_validated_json(body)?;
    let treatment_id = req.treatment_id.trim().to_string();
    let partner_type = partner.partner_type();

    let assessed_at = Utc::now();
    let assessment = state.engine.score(&req.treatment);
    let documents = state.resolver.resolve(&assessment);

    let target = state.webhook_target(partner_type);
    let delivery = match target {
        Some(target) if partner.profile.has_feature(features::WEBHOOKS) => {
            let data = json!({
                "treatment_id": treatment_id,
                "risk": assessment,
                "required_documents": documents,
                "rat": req.rat,
            });
            let result = state.dispatcher.dispatch(target, &treatment_id, data).await;
            delivery_outcome(&state, partner_type, result)?
        }
        _ => DeliveryOutcome::skipped("el partner no tiene webhooks habilitados"),
    };

    tracing::info!(
        partner = %partner_type,
        treatment_id = %treatment_id,
        level = assessment.level.as_str(),
        score = assessment.score,
        delivery = ?delivery.status,
        "treatment processed"
    );

    state
        .audit
        .log(
            partner_type,
            actions::TREATMENT_SUBMITTED,
            json!({
                "treatment_id": treatment_id,
                "level": assessment.level.as_str(),
                "score": assessment.score,
                "delivery": delivery.status,
                "integration_id": delivery.integration_id,
            }),
        )
        .await;

    Ok(Json(TreatmentResponse {
        treatment_id,
        risk: RiskView::from(&assessment),
        required_documents: DocumentView::list(&documents, assessed_at),
        delivery,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(treatment_id: &str, rat: Value) -> SubmitTreatmentRequest {
        SubmitTreatmentRequest {
            treatment_id: treatment_id.into(),
            treatment: TreatmentDescription {
                categories: vec![],
                subject_count: 10,
                international_transfer: false,
                automated_decisions: false,
            },
            rat,
        }
    }

    #[test]
    fn validate_accepts_object_or_missing_rat() {
        assert!(request("rat-1", json!({"finalidad": "nómina"})).validate().is_ok());
        assert!(request("rat-1", Value::Null).validate().is_ok());
    }

    #[test]
    fn validate_rejects_blank_or_oversized_ids() {
        assert!(request("   ", Value::Null).validate().is_err());
        let long = "x".repeat(MAX_TREATMENT_ID_LEN + 1);
        assert!(request(&long, Value::Null).validate().is_err());
    }

    #[test]
    fn validate_rejects_non_object_rat() {
        assert!(request("rat-1", json!([1, 2])).validate().is_err());
    }
}
