//! # OpenAPI Specification Assembly
//!
//! Collects the utoipa-documented routes into one OpenAPI document served
//! at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Partner Integration Gateway",
        version = "0.3.0",
        description = "Authenticated, rate-limited partner API: RAT risk scoring, required compliance documents, signed webhook delivery, and access auditing.",
        license(name = "BUSL-1.1")
    ),
    paths(
        crate::routes::treatments::submit_treatment,
        crate::routes::risk::score_treatment,
        crate::routes::integrations::list_integrations,
        crate::routes::integrations::get_integration,
        crate::routes::integrations::retry_integration,
        crate::routes::audit::list_audit,
        crate::routes::partner::get_partner,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::routes::treatments::SubmitTreatmentRequest,
        crate::routes::treatments::TreatmentResponse,
        crate::routes::risk::RiskView,
        crate::routes::risk::DocumentView,
        crate::routes::risk::ScoreResponse,
        crate::routes::integrations::DeliveryStatus,
        crate::routes::integrations::DeliveryOutcome,
        crate::routes::integrations::IntegrationView,
        crate::routes::integrations::IntegrationListResponse,
        crate::routes::audit::AuditEntryView,
        crate::routes::audit::AuditListResponse,
        crate::routes::partner::PartnerView,
    )),
    tags(
        (name = "treatments", description = "RAT submission and webhook delivery"),
        (name = "risk", description = "Risk scoring"),
        (name = "integrations", description = "Webhook delivery records"),
        (name = "audit", description = "Partner access log"),
        (name = "partner", description = "Partner profile"),
    )
)]
pub struct ApiDoc;

/// Serve the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/v1/treatments",
            "/v1/risk/score",
            "/v1/integrations",
            "/v1/integrations/{id}",
            "/v1/integrations/{id}/retry",
            "/v1/audit",
            "/v1/partner",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
