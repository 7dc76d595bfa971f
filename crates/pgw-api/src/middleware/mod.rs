//! # Middleware Stack
//!
//! Tower middleware for the API layer:
//! - [`tracing_layer`]: request/response tracing with `TraceLayer`.
//! - [`metrics`]: Prometheus request and gateway-event metrics.
//! - [`rate_limit`]: sliding-window limiter with blocklist, per partner tier.
//!
//! Authentication lives in [`crate::auth`].

pub mod metrics;
pub mod rate_limit;
pub mod tracing_layer;
