//! # Per-Partner Rate Limiting
//!
//! Sliding-window limiter with a blocklist, keyed by `(subject, action)`.
//!
//! - `allow` admits at most the tier ceiling per window.
//! - `record_attempt` tracks success/failure and blocks a key once failures
//!   within the window reach `max_attempts`.
//! - `check_rate_limit` is a coarse per-minute cap per subject. Exceeding it
//!   blocks the subject-wide key `(subject, "*")`.
//!
//! State lives in a [`DashMap`]. Every read-modify-write on a key happens
//! while holding that key's shard lock, so concurrent requests on the same
//! key are linearized and never both take the last slot.
//!
//! Once more than `max_tracked_keys` keys exist, idle ones (no attempts in
//! the window, no active block) are swept, at most once per second.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;

use crate::auth::AuthenticatedPartner;
use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;

/// Action name of the subject-wide key set by the per-minute limiter.
pub const SUBJECT_WIDE_ACTION: &str = "*";

/// Action name for per-endpoint API budgets.
pub const API_ACTION: &str = "api";

/// Composite rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub subject: String,
    pub action: String,
}

impl RateLimitKey {
    pub fn new(subject: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            action: action.into(),
        }
    }

    /// Key covering every action of `subject`.
    pub fn subject_wide(subject: impl Into<String>) -> Self {
        Self::new(subject, SUBJECT_WIDE_ACTION)
    }
}

impl std::fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.subject, self.action)
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of the sliding window.
    pub window: Duration,
    /// Failed attempts within the window that trigger a block.
    pub max_attempts: u32,
    /// How long a block lasts.
    pub block_duration: Duration,
    /// Coarse cap on requests per minute per subject.
    pub per_minute_limit: u32,
    /// Requests per window by partner tier.
    pub tier_limits: HashMap<String, u32>,
    /// Requests per window for tiers missing from `tier_limits`.
    pub default_limit: u32,
    /// Reverse proxies in front of the gateway whose `X-Forwarded-For`
    /// entries are trusted. 0 uses the TCP peer address.
    pub trusted_proxy_hops: usize,
    /// Tracked keys above which idle keys are swept.
    pub max_tracked_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let tier_limits = [("basic", 100), ("professional", 500), ("premium", 1000)]
            .into_iter()
            .map(|(tier, limit)| (tier.to_string(), limit))
            .collect();
        Self {
            window: Duration::from_secs(15 * 60),
            max_attempts: 5,
            block_duration: Duration::from_secs(15 * 60),
            per_minute_limit: 120,
            tier_limits,
            default_limit: 100,
            trusted_proxy_hops: 0,
            max_tracked_keys: 100_000,
        }
    }
}

/// Serialized form of [`RateLimitConfig`] in the partner table, with
/// durations in seconds. Missing fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitSettings {
    pub window_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    pub block_duration_secs: Option<u64>,
    pub per_minute_limit: Option<u32>,
    pub default_limit: Option<u32>,
    pub trusted_proxy_hops: Option<usize>,
    pub max_tracked_keys: Option<usize>,
    #[serde(default)]
    pub tiers: HashMap<String, u32>,
}

impl RateLimitSettings {
    /// Overlay these settings on the defaults.
    pub fn into_config(self) -> RateLimitConfig {
        let mut config = RateLimitConfig::default();
        if let Some(secs) = self.window_secs {
            config.window = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_attempts {
            config.max_attempts = n;
        }
        if let Some(secs) = self.block_duration_secs {
            config.block_duration = Duration::from_secs(secs);
        }
        if let Some(n) = self.per_minute_limit {
            config.per_minute_limit = n;
        }
        if let Some(n) = self.default_limit {
            config.default_limit = n;
        }
        if let Some(n) = self.trusted_proxy_hops {
            config.trusted_proxy_hops = n;
        }
        if let Some(n) = self.max_tracked_keys {
            config.max_tracked_keys = n;
        }
        for (tier, limit) in self.tiers {
            config.tier_limits.insert(tier.trim().to_lowercase(), limit);
        }
        config
    }
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    at: Instant,
    success: bool,
}

#[derive(Debug, Default)]
struct KeyState {
    attempts: VecDeque<Attempt>,
    blocked_at: Option<Instant>,
}

impl KeyState {
    /// Whether a block is active at `now`. Clears an expired block along
    /// with the attempts that led to it.
    fn check_block(&mut self, now: Instant, block_duration: Duration) -> bool {
        match self.blocked_at {
            Some(at) if now.saturating_duration_since(at) < block_duration => true,
            Some(_) => {
                self.blocked_at = None;
                self.attempts.clear();
                false
            }
            None => false,
        }
    }

    fn evict(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.attempts.front() {
            if now.saturating_duration_since(front.at) >= window {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures(&self) -> usize {
        self.attempts.iter().filter(|a| !a.success).count()
    }

    fn is_idle(&mut self, now: Instant, config: &RateLimitConfig) -> bool {
        if self.check_block(now, config.block_duration) {
            return false;
        }
        self.evict(now, config.window);
        self.attempts.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
struct MinuteBucket {
    count: u32,
    window_start: Instant,
}

const MINUTE: Duration = Duration::from_secs(60);
const PRUNE_INTERVAL: Duration = Duration::from_secs(1);

/// Why [`RateLimiter::admit`] rejected a request, with the key whose wait
/// applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: &'static str,
    pub key: RateLimitKey,
}

/// Shared rate limiter. Cloning shares state.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: Arc<RateLimitConfig>,
    keys: Arc<DashMap<RateLimitKey, KeyState>>,
    minute_buckets: Arc<DashMap<String, MinuteBucket>>,
    last_prune: Arc<Mutex<Option<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config: Arc::new(config),
            keys: Arc::new(DashMap::new()),
            minute_buckets: Arc::new(DashMap::new()),
            last_prune: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Requests per window for `tier`.
    pub fn max_for_tier(&self, tier: &str) -> u32 {
        self.config
            .tier_limits
            .get(tier)
            .copied()
            .unwrap_or(self.config.default_limit)
    }

    /// Admit one request on `key` under the ceiling of `tier`.
    pub fn allow(&self, key: &RateLimitKey, tier: &str) -> bool {
        self.allow_at(key, tier, Instant::now())
    }

    pub(crate) fn allow_at(&self, key: &RateLimitKey, tier: &str, now: Instant) -> bool {
        let max = self.max_for_tier(tier) as usize;
        self.maybe_prune(now);
        let mut state = self.keys.entry(key.clone()).or_default();
        if state.check_block(now, self.config.block_duration) {
            return false;
        }
        state.evict(now, self.config.window);
        if state.attempts.len() >= max {
            return false;
        }
        state.attempts.push_back(Attempt { at: now, success: true });
        true
    }

    /// Record an attempt outcome. Returns whether the key is still allowed.
    pub fn record_attempt(&self, key: &RateLimitKey, success: bool) -> bool {
        self.record_attempt_at(key, success, Instant::now())
    }

    pub(crate) fn record_attempt_at(&self, key: &RateLimitKey, success: bool, now: Instant) -> bool {
        self.maybe_prune(now);
        let mut state = self.keys.entry(key.clone()).or_default();
        if state.check_block(now, self.config.block_duration) {
            return false;
        }
        state.evict(now, self.config.window);
        state.attempts.push_back(Attempt { at: now, success });
        if !success && state.failures() >= self.config.max_attempts as usize {
            state.blocked_at = Some(now);
            tracing::warn!(key = %key, failures = state.failures(), "rate limit key blocked");
            return false;
        }
        true
    }

    /// Whether `key` is blocked. Does not consume budget.
    pub fn is_blocked(&self, key: &RateLimitKey) -> bool {
        self.is_blocked_at(key, Instant::now())
    }

    pub(crate) fn is_blocked_at(&self, key: &RateLimitKey, now: Instant) -> bool {
        match self.keys.get_mut(key) {
            Some(mut state) => state.check_block(now, self.config.block_duration),
            None => false,
        }
    }

    /// Seconds until the block on `key` expires, rounded up. 0 when not blocked.
    pub fn block_time_remaining(&self, key: &RateLimitKey) -> u64 {
        self.block_time_remaining_at(key, Instant::now())
    }

    pub(crate) fn block_time_remaining_at(&self, key: &RateLimitKey, now: Instant) -> u64 {
        ceil_secs(self.block_remaining(key, now))
    }

    fn block_remaining(&self, key: &RateLimitKey, now: Instant) -> Duration {
        self.keys
            .get(key)
            .and_then(|state| state.blocked_at)
            .map(|at| {
                self.config
                    .block_duration
                    .saturating_sub(now.saturating_duration_since(at))
            })
            .unwrap_or_default()
    }

    /// How long a rejected caller of `key` should wait: the remaining block,
    /// or the time until the oldest attempt leaves the window.
    pub fn retry_after(&self, key: &RateLimitKey) -> Duration {
        self.retry_after_at(key, Instant::now())
    }

    pub(crate) fn retry_after_at(&self, key: &RateLimitKey, now: Instant) -> Duration {
        let blocked = self.block_remaining(key, now);
        if !blocked.is_zero() {
            return blocked;
        }
        self.keys
            .get(key)
            .and_then(|state| state.attempts.front().copied())
            .map(|oldest| {
                self.config
                    .window
                    .saturating_sub(now.saturating_duration_since(oldest.at))
            })
            .unwrap_or_default()
    }

    /// Coarse per-minute cap on `subject`. Exceeding it blocks the
    /// subject-wide key for the block duration.
    pub fn check_rate_limit(&self, subject: &str) -> bool {
        self.check_rate_limit_at(subject, Instant::now())
    }

    pub(crate) fn check_rate_limit_at(&self, subject: &str, now: Instant) -> bool {
        let wide = RateLimitKey::subject_wide(subject);
        if self.is_blocked_at(&wide, now) {
            return false;
        }

        self.maybe_prune(now);
        let exceeded = {
            let mut bucket = self
                .minute_buckets
                .entry(subject.to_string())
                .or_insert(MinuteBucket {
                    count: 0,
                    window_start: now,
                });
            if now.saturating_duration_since(bucket.window_start) >= MINUTE {
                bucket.count = 0;
                bucket.window_start = now;
            }
            bucket.count += 1;
            bucket.count > self.config.per_minute_limit
        };

        if exceeded {
            self.keys.entry(wide).or_default().blocked_at = Some(now);
            tracing::warn!(subject, "per-minute limit exceeded, subject blocked");
            return false;
        }
        true
    }

    /// Give back the newest admitted request on `key`, for a request that
    /// passed the tier ceiling but was rejected afterwards.
    pub fn release(&self, key: &RateLimitKey) {
        if let Some(mut state) = self.keys.get_mut(key) {
            if let Some(pos) = state.attempts.iter().rposition(|a| a.success) {
                state.attempts.remove(pos);
            }
        }
    }

    /// Full admission check for one API request of `subject` on `key`.
    ///
    /// Order: subject-wide block, then tier ceiling, then the per-minute cap.
    /// Only requests within the tier ceiling count towards the per-minute
    /// cap, and a request the cap rejects gives its tier slot back.
    pub fn admit(&self, subject: &str, key: &RateLimitKey, tier: &str) -> Result<(), Rejection> {
        self.admit_at(subject, key, tier, Instant::now())
    }

    pub(crate) fn admit_at(
        &self,
        subject: &str,
        key: &RateLimitKey,
        tier: &str,
        now: Instant,
    ) -> Result<(), Rejection> {
        let wide = RateLimitKey::subject_wide(subject);
        if self.is_blocked_at(&wide, now) {
            return Err(Rejection {
                reason: "per_minute",
                key: wide,
            });
        }
        if !self.allow_at(key, tier, now) {
            return Err(Rejection {
                reason: "tier_ceiling",
                key: key.clone(),
            });
        }
        if !self.check_rate_limit_at(subject, now) {
            self.release(key);
            return Err(Rejection {
                reason: "per_minute",
                key: wide,
            });
        }
        Ok(())
    }

    /// Number of tracked keys.
    pub fn tracked_keys(&self) -> usize {
        self.keys.len()
    }

    fn maybe_prune(&self, now: Instant) {
        if self.keys.len() <= self.config.max_tracked_keys
            && self.minute_buckets.len() <= self.config.max_tracked_keys
        {
            return;
        }
        {
            let mut last = self.last_prune.lock();
            if matches!(*last, Some(at) if now.saturating_duration_since(at) < PRUNE_INTERVAL) {
                return;
            }
            *last = Some(now);
        }
        self.prune_at(now);
    }

    /// Drop idle keys and finished minute buckets.
    pub(crate) fn prune_at(&self, now: Instant) {
        let before = self.keys.len();
        self.keys.retain(|_, state| !state.is_idle(now, &self.config));
        self.minute_buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) < MINUTE);
        tracing::debug!(
            before,
            after = self.keys.len(),
            "pruned idle rate-limit keys"
        );
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Spanish rendering of a wait, e.g. `"15 minutos"` or `"30 segundos"`.
/// Waits of a minute or more round up to whole minutes.
pub fn format_retry_after(wait: Duration) -> String {
    let secs = ceil_secs(wait).max(1);
    if secs >= 60 {
        let minutes = secs.div_ceil(60);
        if minutes == 1 {
            "1 minuto".to_string()
        } else {
            format!("{minutes} minutos")
        }
    } else if secs == 1 {
        "1 segundo".to_string()
    } else {
        format!("{secs} segundos")
    }
}

/// Enforces the per-minute cap and the tier ceiling for the authenticated
/// partner. Keys are `(partner, "*")` and `(partner:route, "api")`.
///
/// Requests without an [`AuthenticatedPartner`] pass through; the auth
/// middleware has already rejected them on protected routes.
pub async fn rate_limit_middleware(request: Request, next: Next) -> Response {
    let limiter = request.extensions().get::<RateLimiter>().cloned();
    let partner = request.extensions().get::<AuthenticatedPartner>().cloned();

    if let (Some(limiter), Some(partner)) = (limiter, partner) {
        let metrics = request.extensions().get::<ApiMetrics>().cloned();
        let subject = partner.partner_type().as_str();
        let route = request
            .extensions()
            .get::<MatchedPath>()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        let key = RateLimitKey::new(format!("{subject}:{route}"), API_ACTION);
        if let Err(Rejection { reason, key }) =
            limiter.admit(subject, &key, partner.profile.tier.as_str())
        {
            if let Some(m) = metrics {
                m.record_rate_limited(reason);
            }
            tracing::info!(partner = subject, %key, reason, "request rate limited");
            return AppError::TooManyRequests {
                retry_after: format_retry_after(limiter.retry_after(&key)),
            }
            .into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(900),
            max_attempts: 3,
            block_duration: Duration::from_secs(900),
            per_minute_limit: 5,
            tier_limits: [("basic".to_string(), 3), ("premium".to_string(), 10)]
                .into_iter()
                .collect(),
            default_limit: 2,
            trusted_proxy_hops: 0,
            max_tracked_keys: 100_000,
        })
    }

    fn key() -> RateLimitKey {
        RateLimitKey::new("prelafit:/v1/treatments", API_ACTION)
    }

    #[test]
    fn each_tier_admits_exactly_its_ceiling() {
        let l = limiter();
        let now = Instant::now();
        for (tier, max) in [("basic", 3), ("premium", 10), ("unknown", 2)] {
            let k = RateLimitKey::new(format!("p-{tier}"), API_ACTION);
            for i in 0..max {
                assert!(l.allow_at(&k, tier, now), "{tier} request {i} rejected");
            }
            assert!(!l.allow_at(&k, tier, now), "{tier} admitted past ceiling");
        }
    }

    #[test]
    fn window_slides() {
        let l = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            assert!(l.allow_at(&key(), "basic", t0));
        }
        assert!(!l.allow_at(&key(), "basic", t0 + Duration::from_secs(899)));
        assert!(l.allow_at(&key(), "basic", t0 + Duration::from_secs(900)));
    }

    #[test]
    fn failures_block_until_expiry() {
        let l = limiter();
        let k = RateLimitKey::new("203.0.113.7", "auth");
        let t0 = Instant::now();
        assert!(l.record_attempt_at(&k, false, t0));
        assert!(l.record_attempt_at(&k, false, t0));
        assert!(!l.record_attempt_at(&k, false, t0));

        assert_eq!(l.block_time_remaining_at(&k, t0), 900);
        assert_eq!(
            l.block_time_remaining_at(&k, t0 + Duration::from_millis(1500)),
            899
        );
        assert!(!l.allow_at(&k, "premium", t0 + Duration::from_secs(10)));
        assert!(l.is_blocked_at(&k, t0 + Duration::from_secs(899)));

        let later = t0 + Duration::from_secs(900);
        assert!(!l.is_blocked_at(&k, later));
        assert_eq!(l.block_time_remaining_at(&k, later), 0);
        assert!(l.allow_at(&k, "premium", later));
    }

    #[test]
    fn successes_do_not_block() {
        let l = limiter();
        let k = RateLimitKey::new("client", "auth");
        let now = Instant::now();
        for _ in 0..20 {
            assert!(l.record_attempt_at(&k, true, now));
        }
        assert_eq!(l.block_time_remaining_at(&k, now), 0);
    }

    #[test]
    fn old_failures_fall_out_of_window() {
        let l = limiter();
        let k = RateLimitKey::new("client", "auth");
        let t0 = Instant::now();
        l.record_attempt_at(&k, false, t0);
        l.record_attempt_at(&k, false, t0);
        assert!(l.record_attempt_at(&k, false, t0 + Duration::from_secs(901)));
    }

    #[test]
    fn blocked_key_does_not_consume_budget() {
        let l = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            l.record_attempt_at(&key(), false, t0);
        }
        for _ in 0..50 {
            assert!(!l.allow_at(&key(), "basic", t0));
        }
        let later = t0 + Duration::from_secs(900);
        for _ in 0..3 {
            assert!(l.allow_at(&key(), "basic", later));
        }
    }

    #[test]
    fn per_minute_cap_blocks_subject() {
        let l = limiter();
        let t0 = Instant::now();
        for _ in 0..5 {
            assert!(l.check_rate_limit_at("prelafit", t0));
        }
        assert!(!l.check_rate_limit_at("prelafit", t0));
        let wide = RateLimitKey::subject_wide("prelafit");
        assert!(l.is_blocked_at(&wide, t0 + Duration::from_secs(120)));
        assert!(!l.check_rate_limit_at("prelafit", t0 + Duration::from_secs(120)));
        assert!(l.check_rate_limit_at("datacompliance", t0));
        assert!(l.check_rate_limit_at("prelafit", t0 + Duration::from_secs(900)));
    }

    #[test]
    fn tier_rejections_do_not_spend_the_minute_cap() {
        let l = limiter();
        let t0 = Instant::now();
        let treatments = RateLimitKey::new("prelafit:/v1/treatments", API_ACTION);
        let audit = RateLimitKey::new("prelafit:/v1/audit", API_ACTION);

        let admitted = (0..10)
            .filter(|_| l.admit_at("prelafit", &treatments, "basic", t0).is_ok())
            .count();
        assert_eq!(admitted, 3);
        assert_eq!(
            l.admit_at("prelafit", &treatments, "basic", t0).unwrap_err().reason,
            "tier_ceiling"
        );

        // Three of five per-minute slots used; two remain for other routes.
        assert!(l.admit_at("prelafit", &audit, "premium", t0).is_ok());
        assert!(l.admit_at("prelafit", &audit, "premium", t0).is_ok());
        let rejected = l.admit_at("prelafit", &audit, "premium", t0).unwrap_err();
        assert_eq!(rejected.reason, "per_minute");
        assert_eq!(rejected.key, RateLimitKey::subject_wide("prelafit"));
    }

    #[test]
    fn minute_cap_rejection_returns_the_tier_slot() {
        let l = RateLimiter::new(RateLimitConfig {
            per_minute_limit: 2,
            tier_limits: [("basic".to_string(), 3)].into_iter().collect(),
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        assert!(l.admit_at("p", &key(), "basic", t0).is_ok());
        assert!(l.admit_at("p", &key(), "basic", t0).is_ok());
        assert!(l.admit_at("p", &key(), "basic", t0).is_err());

        // The rejected request left two tier slots used, not three.
        assert!(l.allow_at(&key(), "basic", t0));
        assert!(!l.allow_at(&key(), "basic", t0));
    }

    #[test]
    fn idle_keys_are_swept_past_the_bound() {
        let l = RateLimiter::new(RateLimitConfig {
            window: Duration::from_secs(900),
            max_attempts: 3,
            block_duration: Duration::from_secs(900),
            max_tracked_keys: 10,
            ..RateLimitConfig::default()
        });
        let t0 = Instant::now();
        for i in 0..50 {
            let k = RateLimitKey::new(format!("10.0.0.{i}"), "auth");
            l.record_attempt_at(&k, false, t0);
        }
        // Every key holds a failure inside the window, so none is idle yet.
        assert_eq!(l.tracked_keys(), 50);

        let blocked = RateLimitKey::new("198.51.100.7", "auth");
        for _ in 0..3 {
            l.record_attempt_at(&blocked, false, t0 + Duration::from_secs(10));
        }

        let later = t0 + Duration::from_secs(901);
        l.record_attempt_at(&RateLimitKey::new("10.1.0.1", "auth"), false, later);
        assert_eq!(l.tracked_keys(), 2, "only the new and the blocked key remain");
        assert!(l.is_blocked_at(&blocked, later));
    }

    #[test]
    fn retry_after_reports_window_reset_when_not_blocked() {
        let l = limiter();
        let t0 = Instant::now();
        for _ in 0..3 {
            l.allow_at(&key(), "basic", t0);
        }
        let wait = l.retry_after_at(&key(), t0 + Duration::from_secs(300));
        assert_eq!(wait, Duration::from_secs(600));
    }

    #[test]
    fn format_retry_after_in_spanish() {
        assert_eq!(format_retry_after(Duration::from_secs(900)), "15 minutos");
        assert_eq!(format_retry_after(Duration::from_secs(60)), "1 minuto");
        assert_eq!(format_retry_after(Duration::from_secs(61)), "2 minutos");
        assert_eq!(format_retry_after(Duration::from_secs(30)), "30 segundos");
        assert_eq!(format_retry_after(Duration::from_millis(200)), "1 segundo");
        assert_eq!(format_retry_after(Duration::ZERO), "1 segundo");
    }

    #[test]
    fn settings_overlay_defaults() {
        let settings: RateLimitSettings = serde_yaml::from_str(
            "window_secs: 60\ntrusted_proxy_hops: 1\ntiers:\n  Enterprise: 5000\n",
        )
        .unwrap();
        let config = settings.into_config();
        assert_eq!(config.trusted_proxy_hops, 1);
        assert_eq!(config.max_tracked_keys, 100_000);
        assert_eq!(config.window, Duration::from_secs(60));
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.tier_limits.get("enterprise"), Some(&5000));
        assert_eq!(config.tier_limits.get("basic"), Some(&100));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_allow_admits_exactly_the_ceiling() {
        let l = limiter();
        let mut handles = Vec::new();
        for _ in 0..64 {
            let l = l.clone();
            handles.push(tokio::spawn(async move { l.allow(&key(), "premium") }));
        }
        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_failures_block_once_threshold_reached() {
        let l = limiter();
        let k = RateLimitKey::new("198.51.100.1", "auth");
        let mut handles = Vec::new();
        for _ in 0..32 {
            let l = l.clone();
            let k = k.clone();
            handles.push(tokio::spawn(async move { l.record_attempt(&k, false) }));
        }
        let mut still_allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                still_allowed += 1;
            }
        }
        assert_eq!(still_allowed, 2);
        assert!(l.block_time_remaining(&k) > 0);
    }
}
