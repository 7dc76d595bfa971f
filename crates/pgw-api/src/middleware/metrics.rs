//! # Prometheus Metrics
//!
//! HTTP-level metrics (request counts, latency, errors) are recorded in
//! middleware. Gateway events (rate-limit rejections, authentication
//! failures, webhook outcomes) are pushed by the code that observes them.
//! The integration-record gauge is refreshed on each `/metrics` scrape.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use pgw_core::IntegrationStatus;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Shared metrics state backed by a Prometheus registry.
#[derive(Clone)]
pub struct ApiMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- HTTP middleware metrics --
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    http_errors_total: IntCounterVec,

    // -- Gateway events --
    rate_limit_rejections_total: IntCounterVec,
    auth_failures_total: IntCounterVec,
    webhook_deliveries_total: IntCounterVec,

    // -- Pull model, refreshed on scrape --
    integration_records: IntGaugeVec,
}

impl std::fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("requests", &self.requests())
            .field("errors", &self.errors())
            .finish()
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), labels).expect("metric can be created")
}

impl ApiMetrics {
    /// Create a new metrics instance with a fresh Prometheus registry.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "pgw_http_requests_total",
            "Total HTTP requests",
            &["method", "path", "status"],
        );
        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pgw_http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
            ]),
            &["method", "path"],
        )
        .expect("metric can be created");
        let http_errors_total = counter_vec(
            "pgw_http_errors_total",
            "Total HTTP errors (4xx and 5xx)",
            &["method", "path", "status"],
        );
        let rate_limit_rejections_total = counter_vec(
            "pgw_rate_limit_rejections_total",
            "Requests rejected by the rate limiter",
            &["reason"],
        );
        let auth_failures_total = counter_vec(
            "pgw_auth_failures_total",
            "Failed partner authentications",
            &["reason"],
        );
        let webhook_deliveries_total = counter_vec(
            "pgw_webhook_deliveries_total",
            "Webhook delivery attempts by outcome",
            &["partner", "outcome"],
        );
        let integration_records = IntGaugeVec::new(
            Opts::new("pgw_integration_records", "Integration records by status"),
            &["status"],
        )
        .expect("metric can be created");

        let collectors: [Box<dyn Collector>; 7] = [
            Box::new(http_requests_total.clone()),
            Box::new(http_request_duration_seconds.clone()),
            Box::new(http_errors_total.clone()),
            Box::new(rate_limit_rejections_total.clone()),
            Box::new(auth_failures_total.clone()),
            Box::new(webhook_deliveries_total.clone()),
            Box::new(integration_records.clone()),
        ];
        for collector in collectors {
            registry
                .register(collector)
                .expect("metric can be registered");
        }

        Self {
            inner: Arc::new(Inner {
                registry,
                http_requests_total,
                http_request_duration_seconds,
                http_errors_total,
                rate_limit_rejections_total,
                auth_failures_total,
                webhook_deliveries_total,
                integration_records,
            }),
        }
    }

    /// Total request count across all labels.
    pub fn requests(&self) -> u64 {
        sum_counter(&self.inner.http_requests_total)
    }

    /// Total error count across all labels.
    pub fn errors(&self) -> u64 {
        sum_counter(&self.inner.http_errors_total)
    }

    fn record_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.inner
            .http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
        if status >= 400 {
            self.inner
                .http_errors_total
                .with_label_values(&[method, path, &status_str])
                .inc();
        }
    }

    /// Count a rate-limit rejection (`per_minute`, `tier_ceiling`, `auth_blocked`).
    pub fn record_rate_limited(&self, reason: &str) {
        self.inner
            .rate_limit_rejections_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a failed authentication (`missing`, `invalid`).
    pub fn record_auth_failure(&self, reason: &str) {
        self.inner
            .auth_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count a webhook attempt. `outcome` is `sent` or a delivery error kind.
    pub fn record_webhook(&self, partner: &str, outcome: &str) {
        self.inner
            .webhook_deliveries_total
            .with_label_values(&[partner, outcome])
            .inc();
    }

    /// Total rate-limit rejections.
    pub fn rate_limited(&self) -> u64 {
        sum_counter(&self.inner.rate_limit_rejections_total)
    }

    /// Total authentication failures.
    pub fn auth_failures(&self) -> u64 {
        sum_counter(&self.inner.auth_failures_total)
    }

    /// Replace the integration-record gauge with fresh counts.
    pub fn set_integration_counts(&self, counts: &HashMap<IntegrationStatus, u64>) {
        let gauge = &self.inner.integration_records;
        for status in [
            IntegrationStatus::Pending,
            IntegrationStatus::Sent,
            IntegrationStatus::Error,
        ] {
            let n = counts.get(&status).copied().unwrap_or(0);
            gauge
                .with_label_values(&[status.as_str()])
                .set(i64::try_from(n).unwrap_or(i64::MAX));
        }
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer)
            .map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

impl Default for ApiMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_counter(vec: &IntCounterVec) -> u64 {
    vec.collect()
        .iter()
        .flat_map(|mf| mf.get_metric())
        .map(|m| m.get_counter().get_value() as u64)
        .sum()
}

/// Records HTTP request metrics. Paths are labelled with the matched route
/// template, so ids never become label values.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let metrics = request.extensions().get::<ApiMetrics>().cloned();
    let method = request.method().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    if let Some(m) = metrics {
        m.record_request(
            &method,
            &path,
            response.status().as_u16(),
            start.elapsed().as_secs_f64(),
        );
    }

    response
}
