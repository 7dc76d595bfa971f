//! # Gateway Bootstrap
//!
//! Loads the partner table at startup and assembles [`AppState`].
//!
//! ## Bootstrap Sequence
//!
//! 1. **Load Partner Table**: Parse YAML from `PARTNERS_CONFIG`.
//! 2. **Resolve Secrets**: API keys and webhook secrets are named by
//!    environment variable, never written in the file.
//! 3. **Validate**: Collect every problem; any error aborts boot.
//! 4. **Choose Stores**: Postgres when a pool is available, otherwise
//!    in-memory.
//! 5. **Log Banner**: Partner and key counts, persistence mode.
//!
//! ## Partner table
//!
//! ```yaml
//! partners:
//!   - type: prelafit
//!     display_name: Prelafit Compliance
//!     tier: premium
//!     webhook_base_url: https://hooks.prelafit.cl/lpdp
//!     webhook_secret_env: PRELAFIT_WEBHOOK_SECRET
//!     is_permanent: true
//!     enabled_features: [risk_assessment, webhooks, integrations, audit_log]
//! api_keys:
//!   - partner: prelafit
//!     key_env: PRELAFIT_API_KEY
//! rate_limits:
//!   window_secs: 900
//!   trusted_proxy_hops: 1   # one load balancer appends X-Forwarded-For
//!   tiers: { basic: 100, premium: 1000 }
//! ```

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pgw_compliance::{DocumentRules, ScoringConfig};
use pgw_core::{features, PartnerProfile, PartnerTier, PartnerType};
use pgw_crypto::WebhookSecret;
use pgw_webhook::{DispatcherConfig, InMemoryIntegrationStore, WebhookTarget};
use serde::Deserialize;
use url::Url;

use crate::audit::InMemoryAuditStore;
use crate::auth::ApiKeyBinding;
use crate::db::{audit::PgAuditStore, integrations::PgIntegrationStore};
use crate::middleware::rate_limit::{RateLimitConfig, RateLimitSettings};
use crate::state::{AppConfig, AppState};

/// Environment variable naming the partner table path.
pub const PARTNERS_CONFIG_ENV: &str = "PARTNERS_CONFIG";

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors during gateway bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// `PARTNERS_CONFIG` is unset.
    #[error("{PARTNERS_CONFIG_ENV} is not set")]
    ConfigPathMissing,

    /// Partner table file not found at the given path.
    #[error("partner table not found: {path}")]
    TableNotFound { path: String },

    /// The file is not valid YAML for the table schema.
    #[error("partner table could not be parsed: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The table parsed but failed validation.
    #[error("invalid partner table: {errors:?}")]
    InvalidTable { errors: Vec<String> },

    /// Webhook dispatcher configuration or construction failed.
    #[error("webhook dispatcher error: {0}")]
    Dispatcher(String),

    /// IO error during bootstrap.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// File schema
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartnerTableFile {
    partners: Vec<PartnerEntry>,
    #[serde(default)]
    api_keys: Vec<KeyEntry>,
    #[serde(default)]
    rate_limits: RateLimitSettings,
    #[serde(default)]
    scoring: ScoringConfig,
    #[serde(default)]
    documents: DocumentRules,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartnerEntry {
    #[serde(rename = "type")]
    partner_type: PartnerType,
    display_name: String,
    tier: PartnerTier,
    #[serde(default)]
    webhook_base_url: Option<Url>,
    #[serde(default)]
    webhook_secret_env: Option<String>,
    #[serde(default = "default_true")]
    requires_api_key: bool,
    #[serde(default)]
    is_permanent: bool,
    #[serde(default)]
    enabled_features: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyEntry {
    partner: PartnerType,
    key_env: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Validated table
// ---------------------------------------------------------------------------

/// The validated partner table with secrets resolved.
#[derive(Debug)]
pub struct PartnerTable {
    pub profiles: Vec<PartnerProfile>,
    pub bindings: Vec<ApiKeyBinding>,
    pub webhook_targets: HashMap<PartnerType, WebhookTarget>,
    pub rate_limits: RateLimitConfig,
    pub scoring: ScoringConfig,
    pub documents: DocumentRules,
}

impl PartnerTable {
    /// Load from the path in `PARTNERS_CONFIG`, resolving secrets from the
    /// process environment.
    pub fn from_env() -> Result<Self, BootstrapError> {
        let path = std::env::var(PARTNERS_CONFIG_ENV).map_err(|_| BootstrapError::ConfigPathMissing)?;
        Self::load(&PathBuf::from(path))
    }

    /// Load from `path`, resolving secrets from the process environment.
    pub fn load(path: &Path) -> Result<Self, BootstrapError> {
        if !path.exists() {
            return Err(BootstrapError::TableNotFound {
                path: path.display().to_string(),
            });
        }
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml, |var| std::env::var(var).ok())
    }

    /// Parse and validate `yaml`, resolving `*_env` references with `lookup`.
    pub fn from_yaml_str(
        yaml: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, BootstrapError> {
        let file: PartnerTableFile = serde_yaml::from_str(yaml)?;
        validate_and_resolve(file, &lookup)
    }
}

fn validate_and_resolve(
    file: PartnerTableFile,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<PartnerTable, BootstrapError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut profiles = Vec::with_capacity(file.partners.len());
    let mut webhook_targets = HashMap::new();

    if file.partners.is_empty() {
        errors.push("at least one partner is required".to_string());
    }

    for entry in file.partners {
        let partner = entry.partner_type.clone();
        if !seen.insert(partner.clone()) {
            errors.push(format!("duplicate partner type \"{partner}\""));
            continue;
        }
        for feature in &entry.enabled_features {
            if !features::ALL.contains(&feature.as_str()) {
                errors.push(format!("partner \"{partner}\": unknown feature \"{feature}\""));
            }
        }

        let secret = match &entry.webhook_secret_env {
            Some(var) => match resolve_env(lookup, var) {
                Some(raw) => match WebhookSecret::new(raw) {
                    Ok(s) => Some(s),
                    Err(e) => {
                        errors.push(format!("partner \"{partner}\": webhook secret in {var}: {e}"));
                        None
                    }
                },
                None => {
                    errors.push(format!("partner \"{partner}\": {var} is not set or empty"));
                    None
                }
            },
            None => None,
        };

        if entry.enabled_features.contains(features::WEBHOOKS) {
            if entry.webhook_base_url.is_none() {
                errors.push(format!(
                    "partner \"{partner}\": feature \"webhooks\" requires webhook_base_url"
                ));
            }
            if entry.webhook_secret_env.is_none() {
                errors.push(format!(
                    "partner \"{partner}\": feature \"webhooks\" requires webhook_secret_env"
                ));
            }
        }

        if let (Some(url), Some(secret)) = (&entry.webhook_base_url, secret) {
            webhook_targets.insert(
                partner.clone(),
                WebhookTarget {
                    partner_type: partner.clone(),
                    url: url.clone(),
                    secret,
                },
            );
        }

        let profile = PartnerProfile {
            partner_type: entry.partner_type,
            display_name: entry.display_name,
            tier: entry.tier,
            webhook_base_url: entry.webhook_base_url,
            requires_api_key: entry.requires_api_key,
            is_permanent: entry.is_permanent,
            enabled_features: entry.enabled_features,
        };
        if let Err(e) = profile.validate() {
            errors.push(e.to_string());
        }
        profiles.push(profile);
    }

    let by_type: HashMap<&PartnerType, &PartnerProfile> =
        profiles.iter().map(|p| (&p.partner_type, p)).collect();
    let mut bindings = Vec::with_capacity(file.api_keys.len());
    let mut seen_keys = HashSet::new();

    for entry in file.api_keys {
        let Some(profile) = by_type.get(&entry.partner) else {
            errors.push(format!(
                "api key in {} references unknown partner \"{}\"",
                entry.key_env, entry.partner
            ));
            continue;
        };
        if !profile.is_permanent && entry.expires_at.is_none() {
            errors.push(format!(
                "api key in {} for non-permanent partner \"{}\" must set expires_at",
                entry.key_env, entry.partner
            ));
        }
        let Some(key) = resolve_env(lookup, &entry.key_env) else {
            errors.push(format!("{} is not set or empty", entry.key_env));
            continue;
        };
        if !seen_keys.insert(key.clone()) {
            errors.push(format!("{} duplicates another partner's API key", entry.key_env));
            continue;
        }
        bindings.push(ApiKeyBinding::new(key, entry.partner, entry.expires_at));
    }

    for profile in &profiles {
        if profile.requires_api_key && !bindings.iter().any(|b| b.partner_type == profile.partner_type) {
            tracing::warn!(
                partner = %profile.partner_type,
                "partner requires an API key but has none configured"
            );
        }
    }

    let rate_limits = file.rate_limits.into_config();
    if rate_limits.window.is_zero() || rate_limits.block_duration.is_zero() {
        errors.push("rate_limits: window and block duration must be positive".to_string());
    }
    if rate_limits.max_attempts == 0 || rate_limits.per_minute_limit == 0 {
        errors.push("rate_limits: max_attempts and per_minute_limit must be positive".to_string());
    }
    if rate_limits.max_tracked_keys == 0 {
        errors.push("rate_limits: max_tracked_keys must be positive".to_string());
    }

    let t = file.scoring.thresholds;
    if !(t.critical >= t.high && t.high >= t.medium) {
        errors.push(format!(
            "scoring thresholds must satisfy critical >= high >= medium, got {}/{}/{}",
            t.critical, t.high, t.medium
        ));
    }

    if !errors.is_empty() {
        return Err(BootstrapError::InvalidTable { errors });
    }

    Ok(PartnerTable {
        profiles,
        bindings,
        webhook_targets,
        rate_limits,
        scoring: file.scoring,
        documents: file.documents,
    })
}

fn resolve_env(lookup: &dyn Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// State assembly
// ---------------------------------------------------------------------------

/// Build [`AppState`] from a validated table. Uses Postgres stores when
/// `db_pool` is present, in-memory stores otherwise.
pub fn bootstrap(
    table: PartnerTable,
    config: AppConfig,
    dispatcher_config: DispatcherConfig,
    db_pool: Option<sqlx::PgPool>,
) -> Result<AppState, BootstrapError> {
    log_banner(&table, db_pool.is_some());

    let state = match &db_pool {
        Some(pool) => AppState::new(
            table,
            config,
            dispatcher_config,
            Arc::new(PgIntegrationStore::new(pool.clone())),
            Arc::new(PgAuditStore::new(pool.clone())),
        ),
        None => AppState::new(
            table,
            config,
            dispatcher_config,
            Arc::new(InMemoryIntegrationStore::new()),
            Arc::new(InMemoryAuditStore::new()),
        ),
    }
    .map_err(|e| BootstrapError::Dispatcher(e.to_string()))?;

    Ok(state.with_db_pool(db_pool))
}

fn log_banner(table: &PartnerTable, persistent: bool) {
    tracing::info!(
        partners = table.profiles.len(),
        api_keys = table.bindings.len(),
        webhook_targets = table.webhook_targets.len(),
        persistence = if persistent { "postgres" } else { "in-memory" },
        "partner table loaded"
    );
    for profile in &table.profiles {
        tracing::info!(
            partner = %profile.partner_type,
            tier = %profile.tier,
            features = ?profile.enabled_features,
            "partner registered"
        );
    }
}
