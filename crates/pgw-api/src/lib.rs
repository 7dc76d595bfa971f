//! # pgw-api: Axum Service for the Partner Integration Gateway
//!
//! Authenticates compliance partners, enforces tiered rate limits, scores
//! submitted treatment records (RAT), resolves required documents, delivers
//! signed webhooks, and keeps an append-only access log.
//!
//! ## API Surface
//!
//! | Prefix                 | Module                      | Feature            |
//! |------------------------|-----------------------------|--------------------|
//! | `/v1/treatments`       | [`routes::treatments`]      | `risk_assessment`  |
//! | `/v1/risk/score`       | [`routes::risk`]            | `risk_assessment`  |
//! | `/v1/integrations/*`   | [`routes::integrations`]    | `integrations`     |
//! | `/v1/audit`            | [`routes::audit`]           | `audit_log`        |
//! | `/v1/partner`          | [`routes::partner`]         | none               |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → RateLimitMiddleware → Handler
//! ```
//!
//! Auth runs before rate limiting so unauthenticated requests never consume
//! a partner's budget. Failed authentications are tracked per client and
//! block brute-force attempts with 429.
//!
//! ## OpenAPI
//!
//! Generated by utoipa at `/openapi.json` (authenticated).

pub mod audit;
pub mod auth;
pub mod bootstrap;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::{Extension, Router};

use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let metrics_on = state.config.metrics_enabled;
    let metrics = state.metrics.clone();

    let mut api = Router::new()
        .merge(routes::treatments::router())
        .merge(routes::risk::router())
        .merge(routes::integrations::router())
        .merge(routes::audit::router())
        .merge(routes::partner::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(state.config.body_limit_bytes))
        .layer(from_fn(middleware::rate_limit::rate_limit_middleware))
        .layer(from_fn(auth::auth_middleware));

    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(middleware::tracing_layer::layer())
        .layer(Extension(state.authenticator.clone()))
        .layer(Extension(state.limiter.clone()))
        .with_state(state.clone());

    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

/// GET /metrics: Prometheus scrape endpoint.
///
/// Refreshes the integration-record gauge from the store before encoding.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    match state.integrations().count_by_status().await {
        Ok(counts) => metrics.set_integration_counts(&counts),
        Err(e) => tracing::warn!(error = %e, "integration gauge refresh failed"),
    }

    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe: 200 while the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: 503 when the database is configured but unreachable.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }
    (StatusCode::OK, "ready").into_response()
}
