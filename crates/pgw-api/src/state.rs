//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor.
//!
//! Everything here is either immutable after startup (partner table,
//! scoring configuration) or internally synchronized (rate limiter, stores).
//! Cloning is cheap: every field is an `Arc` or a small `Copy` value.

use std::collections::HashMap;
use std::sync::Arc;

use pgw_compliance::{DocumentRequirementResolver, RiskScoringEngine};
use pgw_core::PartnerType;
use pgw_webhook::{DispatchError, DispatcherConfig, IntegrationStore, WebhookDispatcher, WebhookTarget};
use sqlx::PgPool;

use crate::audit::{AccessAuditLogger, AuditStore};
use crate::auth::PartnerAuthenticator;
use crate::bootstrap::PartnerTable;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::RateLimiter;

/// Server configuration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Whether `/metrics` and the metrics middleware are mounted.
    pub metrics_enabled: bool,
    /// Largest accepted request body.
    pub body_limit_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            metrics_enabled: true,
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Read `PORT` and `PGW_METRICS_ENABLED`.
    ///
    /// Metrics stay enabled unless the variable is exactly `"false"`
    /// (case-insensitive). An unparseable port falls back to 8080 with a
    /// warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("PORT") {
            match raw.parse() {
                Ok(port) => config.port = port,
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid PORT"),
            }
        }
        config.metrics_enabled = std::env::var("PGW_METRICS_ENABLED")
            .map(|v| !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);
        config
    }
}

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    pub authenticator: PartnerAuthenticator,
    pub limiter: RateLimiter,
    pub engine: RiskScoringEngine,
    pub resolver: DocumentRequirementResolver,
    pub dispatcher: WebhookDispatcher,
    pub webhook_targets: Arc<HashMap<PartnerType, WebhookTarget>>,
    pub audit: AccessAuditLogger,
    pub metrics: ApiMetrics,
    pub config: AppConfig,
    /// Postgres pool when `DATABASE_URL` is set. Stores already wrap it;
    /// kept here for readiness checks.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// Assemble state from a validated partner table and the chosen stores.
    pub fn new(
        table: PartnerTable,
        config: AppConfig,
        dispatcher_config: DispatcherConfig,
        integrations: Arc<dyn IntegrationStore>,
        audit: Arc<dyn AuditStore>,
    ) -> Result<Self, DispatchError> {
        let PartnerTable {
            profiles,
            bindings,
            webhook_targets,
            rate_limits,
            scoring,
            documents,
        } = table;

        Ok(Self {
            authenticator: PartnerAuthenticator::new(profiles, bindings),
            limiter: RateLimiter::new(rate_limits),
            engine: RiskScoringEngine::new(scoring),
            resolver: DocumentRequirementResolver::new(documents),
            dispatcher: WebhookDispatcher::new(dispatcher_config, integrations)?,
            webhook_targets: Arc::new(webhook_targets),
            audit: AccessAuditLogger::new(audit),
            metrics: ApiMetrics::new(),
            config,
            db_pool: None,
        })
    }

    /// Attach the Postgres pool used for readiness checks.
    pub fn with_db_pool(mut self, pool: Option<PgPool>) -> Self {
        self.db_pool = pool;
        self
    }

    /// The integration record store behind the dispatcher.
    pub fn integrations(&self) -> &Arc<dyn IntegrationStore> {
        self.dispatcher.store()
    }

    /// Webhook target of `partner_type`, if it has one configured.
    pub fn webhook_target(&self, partner_type: &PartnerType) -> Option<&WebhookTarget> {
        self.webhook_targets.get(partner_type)
    }
}
