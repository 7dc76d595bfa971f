//! # Partner Authentication
//!
//! Resolves an opaque API key to a [`PartnerProfile`].
//!
//! ## Credentials
//!
//! ```text
//! Authorization: Bearer <key>
//! X-Api-Key: <key>
//! X-Partner-Type: <type>        (only for partners with requires_api_key = false)
//! ```
//!
//! Missing and invalid keys produce byte-identical 401 responses. Unknown,
//! revoked, and expired keys are all [`AuthError::Invalid`].
//!
//! Every failure is recorded on the `(client, "auth")` rate-limit key. A
//! blocked client gets 429 before any key lookup happens. The client is the
//! TCP peer address, or the `X-Forwarded-For` entry appended by the
//! outermost of `trusted_proxy_hops` proxies. Entries to the left of that
//! are caller-supplied and ignored.
//!
//! ## AuthenticatedPartner
//!
//! Every authenticated request gets an [`AuthenticatedPartner`] injected into
//! the request extensions. Handlers extract it via the `FromRequestParts` impl.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use pgw_core::{mask_secret, PartnerProfile, PartnerType};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::AppError;
use crate::middleware::metrics::ApiMetrics;
use crate::middleware::rate_limit::{format_retry_after, RateLimitKey, RateLimiter};

/// Header carrying an API key as an alternative to `Authorization: Bearer`.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming a keyless partner.
pub const PARTNER_TYPE_HEADER: &str = "x-partner-type";

/// Rate-limit action recording authentication attempts per client.
pub const AUTH_ACTION: &str = "auth";

/// Why a request could not be authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented.
    #[error("API key missing")]
    Missing,
    /// The credential matches no active binding.
    #[error("API key invalid")]
    Invalid,
}

impl AuthError {
    /// Metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Invalid => "invalid",
        }
    }
}

// ── Key bindings ────────────────────────────────────────────────────────────

/// One issued API key. Revocation is removal from the table.
pub struct ApiKeyBinding {
    key: Zeroizing<String>,
    pub partner_type: PartnerType,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKeyBinding {
    pub fn new(
        key: impl Into<String>,
        partner_type: PartnerType,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            key: Zeroizing::new(key.into()),
            partner_type,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Masked key for logs.
    pub fn masked_key(&self) -> String {
        mask_secret(&self.key)
    }

    fn matches(&self, presented: &str) -> bool {
        constant_time_key_eq(presented, &self.key)
    }
}

impl std::fmt::Debug for ApiKeyBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyBinding")
            .field("key", &"[REDACTED]")
            .field("partner_type", &self.partner_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Constant-time comparison of API keys.
///
/// When lengths differ, performs a dummy comparison so the timing does not
/// depend on how much of the key matched.
fn constant_time_key_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

// ── Authenticator ───────────────────────────────────────────────────────────

struct Registry {
    profiles: HashMap<PartnerType, Arc<PartnerProfile>>,
    bindings: Vec<ApiKeyBinding>,
}

/// Immutable partner table plus key bindings, shared by all requests.
#[derive(Clone)]
pub struct PartnerAuthenticator {
    inner: Arc<Registry>,
}

impl std::fmt::Debug for PartnerAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartnerAuthenticator")
            .field("partners", &self.inner.profiles.len())
            .field("bindings", &self.inner.bindings.len())
            .finish()
    }
}

impl PartnerAuthenticator {
    pub fn new(profiles: Vec<PartnerProfile>, bindings: Vec<ApiKeyBinding>) -> Self {
        let profiles = profiles
            .into_iter()
            .map(|p| (p.partner_type.clone(), Arc::new(p)))
            .collect();
        Self {
            inner: Arc::new(Registry { profiles, bindings }),
        }
    }

    pub fn profile(&self, partner_type: &PartnerType) -> Option<Arc<PartnerProfile>> {
        self.inner.profiles.get(partner_type).cloned()
    }

    /// All profiles, ordered by partner type.
    pub fn profiles(&self) -> Vec<Arc<PartnerProfile>> {
        let mut all: Vec<_> = self.inner.profiles.values().cloned().collect();
        all.sort_by(|a, b| a.partner_type.cmp(&b.partner_type));
        all
    }

    pub fn binding_count(&self) -> usize {
        self.inner.bindings.len()
    }

    /// Resolve a presented key to its partner.
    pub fn resolve(&self, api_key: Option<&str>) -> Result<Arc<PartnerProfile>, AuthError> {
        self.resolve_at(api_key, Utc::now())
    }

    /// Resolve as of `now`. Every binding is compared so that lookup time
    /// does not depend on which binding matched.
    pub fn resolve_at(
        &self,
        api_key: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Arc<PartnerProfile>, AuthError> {
        let key = api_key
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(AuthError::Missing)?;

        let mut matched = None;
        for binding in &self.inner.bindings {
            if binding.matches(key) {
                matched = Some(binding);
            }
        }

        let binding = matched
            .filter(|b| !b.is_expired_at(now))
            .ok_or(AuthError::Invalid)?;
        self.profile(&binding.partner_type).ok_or(AuthError::Invalid)
    }

    /// Resolve a keyless partner by its type. Partners that require a key
    /// cannot be reached this way.
    pub fn resolve_keyless(&self, partner_type: &str) -> Result<Arc<PartnerProfile>, AuthError> {
        let partner_type = PartnerType::new(partner_type.trim()).map_err(|_| AuthError::Invalid)?;
        match self.profile(&partner_type) {
            Some(p) if !p.requires_api_key => Ok(p),
            _ => Err(AuthError::Invalid),
        }
    }
}

// ── AuthenticatedPartner ────────────────────────────────────────────────────

/// The partner behind the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedPartner {
    pub profile: Arc<PartnerProfile>,
}

impl AuthenticatedPartner {
    pub fn partner_type(&self) -> &PartnerType {
        &self.profile.partner_type
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for AuthenticatedPartner {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedPartner>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 403 unless the partner has `feature` enabled.
pub fn require_feature(partner: &AuthenticatedPartner, feature: &str) -> Result<(), AppError> {
    if partner.profile.has_feature(feature) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "la funcionalidad '{feature}' no está habilitada para este partner"
        )))
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Key from `Authorization: Bearer` or `X-Api-Key`, in that order.
fn extract_api_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    bearer.or_else(|| headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok()))
}

/// Client identity for brute-force tracking.
///
/// With `trusted_hops == 0` this is the peer address. Otherwise the peer is
/// the innermost trusted proxy and the client is the `trusted_hops`-th
/// `X-Forwarded-For` entry counted from the right. A header too short to
/// contain it falls back to the peer. `"anonymous"` without a peer address.
fn client_id(request: &Request, trusted_hops: usize) -> String {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());

    let forwarded = (trusted_hops > 0)
        .then(|| request.headers().get("x-forwarded-for"))
        .flatten()
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let hops: Vec<&str> = v.split(',').map(str::trim).collect();
            hops.len()
                .checked_sub(trusted_hops)
                .map(|i| hops[i])
                .filter(|hop| !hop.is_empty())
                .map(str::to_string)
        });

    forwarded
        .or(peer)
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Authenticate the request and inject [`AuthenticatedPartner`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(authenticator) = request.extensions().get::<PartnerAuthenticator>().cloned() else {
        return AppError::Internal("partner authenticator not configured".into()).into_response();
    };
    let limiter = request.extensions().get::<RateLimiter>().cloned();
    let metrics = request.extensions().get::<ApiMetrics>().cloned();

    let trusted_hops = limiter
        .as_ref()
        .map_or(0, |l| l.config().trusted_proxy_hops);
    let client = client_id(&request, trusted_hops);
    let client_key = RateLimitKey::new(client.as_str(), AUTH_ACTION);

    if let Some(limiter) = &limiter {
        if limiter.is_blocked(&client_key) {
            if let Some(m) = &metrics {
                m.record_rate_limited("auth_blocked");
            }
            tracing::warn!(client = %client, "authentication rejected: client blocked");
            return AppError::TooManyRequests {
                retry_after: format_retry_after(limiter.retry_after(&client_key)),
            }
            .into_response();
        }
    }

    let headers = request.headers();
    let presented = extract_api_key(headers);
    let outcome = match (presented, headers.get(PARTNER_TYPE_HEADER)) {
        (Some(key), _) => authenticator.resolve(Some(key)),
        (None, Some(partner_type)) => partner_type
            .to_str()
            .map_err(|_| AuthError::Invalid)
            .and_then(|p| authenticator.resolve_keyless(p)),
        (None, None) => Err(AuthError::Missing),
    };

    match outcome {
        Ok(profile) => {
            tracing::debug!(partner = %profile.partner_type, "partner authenticated");
            request
                .extensions_mut()
                .insert(AuthenticatedPartner { profile });
            next.run(request).await
        }
        Err(err) => {
            let masked = presented.map(mask_secret).unwrap_or_default();
            tracing::warn!(client = %client, key = %masked, reason = err.reason(), "authentication failed");
            if let Some(m) = &metrics {
                m.record_auth_failure(err.reason());
            }
            if let Some(limiter) = &limiter {
                limiter.record_attempt(&client_key, false);
            }
            AppError::Unauthorized.into_response()
        }
    }
}
