//! # Partner Profile API

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::audit::actions;
use crate::auth::AuthenticatedPartner;
use crate::state::AppState;

/// The caller's resolved profile. Secrets are never included.
#[derive(Debug, Serialize, ToSchema)]
pub struct PartnerView {
    #[serde(rename = "type")]
    pub partner_type: String,
    pub display_name: String,
    pub tier: String,
    pub webhook_base_url: Option<String>,
    pub webhook_configured: bool,
    pub requires_api_key: bool,
    pub is_permanent: bool,
    pub enabled_features: Vec<String>,
    /// Requests admitted per rate-limit window for this tier.
    pub requests_per_window: u32,
    pub window_secs: u64,
}

/// Build the partner router.
pub fn router() -> Router<AppState> {
    Router::new().route("/v1/partner", get(get_partner))
}

/// GET /v1/partner: Profile of the authenticated partner.
#[utoipa::path(
    get,
    path = "/v1/partner",
    responses(
        (status = 200, description = "Partner profile", body = PartnerView),
        (status = 401, description = "Missing or invalid API key", body = crate::error::ErrorBody),
    ),
    tag = "partner"
)]
pub async fn get_partner(
    State(state): State<AppState>,
    partner: AuthenticatedPartner,
) -> Json<PartnerView> {
    let profile = &partner.profile;
    state
        .audit
        .log(partner.partner_type(), actions::PARTNER_VIEWED, json!({}))
        .await;

    Json(PartnerView {
        partner_type: profile.partner_type.as_str().to_string(),
        display_name: profile.display_name.clone(),
        tier: profile.tier.as_str().to_string(),
        webhook_base_url: profile.webhook_base_url.as_ref().map(|u| u.to_string()),
        webhook_configured: state.webhook_target(&profile.partner_type).is_some(),
        requires_api_key: profile.requires_api_key,
        is_permanent: profile.is_permanent,
        enabled_features: profile.enabled_features.iter().cloned().collect(),
        requests_per_window: state.limiter.max_for_tier(profile.tier.as_str()),
        window_secs: state.limiter.config().window.as_secs(),
    })
}
