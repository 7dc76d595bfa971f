//! # Risk Scoring API
//!
//! Stateless scoring of a treatment description. Nothing is persisted and
//! no webhook is sent; use `POST /v1/treatments` for the full write path.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use pgw_core::{features, RequiredDocument, RiskAssessment, TreatmentDescription};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::audit::actions;
use crate::auth::{require_feature, AuthenticatedPartner};
use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

/// A scored treatment as returned to partners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RiskView {
    /// `BAJO`, `MEDIO`, `ALTO` or `CRITICO`.
    pub level: String,
    pub score: u32,
    /// Triggered factor labels in trigger order.
    pub factors: Vec<String>,
}

impl From<&RiskAssessment> for RiskView {
    fn from(assessment: &RiskAssessment) -> Self {
        Self {
            level: assessment.level.as_str().to_string(),
            score: assessment.score,
            factors: assessment
                .factor_labels()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// A required document with its due date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DocumentView {
    #[serde(rename = "type")]
    pub document_type: String,
    /// `media`, `alta` or `critica`.
    pub urgency: String,
    pub deadline_days: u32,
    pub legal_basis_ref: String,
    pub due_at: DateTime<Utc>,
}

impl DocumentView {
    pub fn new(document: &RequiredDocument, assessed_at: DateTime<Utc>) -> Self {
        Self {
            document_type: document.document_type.as_str().to_string(),
            urgency: document.urgency.as_str().to_string(),
            deadline_days: document.deadline_days,
            legal_basis_ref: document.legal_basis_ref.clone(),
            due_at: document.due_at(assessed_at),
        }
    }

    pub fn list(documents: &[RequiredDocument], assessed_at: DateTime<Utc>) -> Vec<Self> {
        documents
            .iter()
            .map(|d| Self::new(d, assessed_at))
            .collect()
    }
}

/// Scoring result.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreResponse {
    pub risk: RiskView,
    pub required_documents: Vec<DocumentView>,
    pub assessed_at: DateTime<Utc>,
}

/// Build the risk router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/risk/score", post(score_treatment))
}

/// POST /v1/risk/score: Score a treatment and list required documents.
#[utoipa::path(
    post,
    path = "/v1/risk/score",
    request_body(content = Object, description = "Treatment description: categories, subject_count, international_transfer, automated_decisions"),
    responses(
        (status = 200, description = "Risk assessment", body = ScoreResponse),
        (status = 400, description = "Malformed body", body = crate::error::ErrorBody),
        (status = 403, description = "risk_assessment feature disabled", body = crate::error::ErrorBody),
    ),
    tag = "risk"
)]
pub async fn score_treatment(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
    body: Result<Json<TreatmentDescription>, JsonRejection>,
) -> Result<Json<ScoreResponse>, AppError> {
    require_feature(&partner, features::RISK_ASSESSMENT)?;
    let treatment = extract_json(body)?;

    let assessed_at = Utc::now();
    let assessment = state.engine.score(&treatment);
    let documents = state.resolver.resolve(&assessment);

    state
        .audit
        .log(
            partner.partner_type(),
            actions::RISK_SCORED,
            json!({
                "level": assessment.level.as_str(),
                "score": assessment.score,
                "documents": documents.len(),
            }),
        )
        .await;

    Ok(Json(ScoreResponse {
        risk: RiskView::from(&assessment),
        required_documents: DocumentView::list(&documents, assessed_at),
        assessed_at,
    }))
}
