//! Outbound webhook payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name for a completed treatment record.
pub const EVENT_RAT_COMPLETED: &str = "rat_completed";

/// Body of every outbound webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Event name.
    pub event: String,
    /// ISO-8601 UTC emission time, millisecond precision.
    pub timestamp: String,
    /// Event data, opaque to the dispatcher.
    pub data: Value,
    /// Emitting system.
    pub source: String,
}

impl WebhookPayload {
    /// A `rat_completed` event emitted at `at`.
    pub fn rat_completed(data: Value, source: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            event: EVENT_RAT_COMPLETED.to_string(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
            source: source.into(),
        }
    }
}
