//! Dispatcher configuration.
//!
//! Defaults match production. Override via environment variables or
//! explicit construction in tests.

use std::time::Duration;

/// Default outbound request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default `source` field of outbound payloads.
pub const DEFAULT_SOURCE: &str = "lpdp-gateway";

/// Configuration for outbound webhook delivery.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on one delivery attempt, connect through body.
    pub timeout: Duration,
    /// Value of the payload `source` field identifying this gateway.
    pub source: String,
    /// Longest response or error body kept on an integration record.
    pub max_stored_body_bytes: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            source: DEFAULT_SOURCE.to_string(),
            max_stored_body_bytes: 4096,
        }
    }
}

impl DispatcherConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PGW_WEBHOOK_TIMEOUT_SECS` (default: 30)
    /// - `PGW_WEBHOOK_SOURCE` (default: `lpdp-gateway`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("PGW_WEBHOOK_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(raw.clone()))?;
            if secs == 0 {
                return Err(ConfigError::InvalidTimeout(raw));
            }
            config.timeout = Duration::from_secs(secs);
        }
        if let Ok(source) = std::env::var("PGW_WEBHOOK_SOURCE") {
            if source.trim().is_empty() {
                return Err(ConfigError::EmptySource);
            }
            config.source = source;
        }
        Ok(config)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("PGW_WEBHOOK_TIMEOUT_SECS must be a positive integer, got \"{0}\"")]
    InvalidTimeout(String),
    #[error("PGW_WEBHOOK_SOURCE must not be empty")]
    EmptySource,
}
