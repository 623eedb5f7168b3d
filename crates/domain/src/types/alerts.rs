//! Structured alert events emitted through the alert sink port

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// Alert categories the pipeline core can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    AuthenticationFailure,
    RateLimitExhausted,
    QuotaThreshold,
}

/// A structured event handed to the alert sink. Delivery transport is
/// the sink implementation's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl AlertEvent {
    pub fn new(
        kind: AlertKind,
        severity: AlertSeverity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.into(),
            message: message.into(),
            context: serde_json::Map::new(),
        }
    }

    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn authentication_failure(message: impl Into<String>) -> Self {
        Self::new(
            AlertKind::AuthenticationFailure,
            AlertSeverity::Critical,
            "Listing feed authentication failed",
            message,
        )
    }

    pub fn rate_limit_exhausted(retries: u32) -> Self {
        Self::new(
            AlertKind::RateLimitExhausted,
            AlertSeverity::Warning,
            "Listing feed rate limit exhausted",
            format!("Rate limit still exceeded after {retries} retries"),
        )
        .with_context("retries", serde_json::Value::from(retries))
    }

    pub fn quota_threshold(window: &str, usage_fraction: f64, severity: AlertSeverity) -> Self {
        Self::new(
            AlertKind::QuotaThreshold,
            severity,
            format!("API {window} quota threshold reached"),
            format!("{window} quota usage at {:.1}%", usage_fraction * 100.0),
        )
        .with_context("window", serde_json::Value::from(window))
        .with_context("usage_fraction", serde_json::Value::from(usage_fraction))
    }
}
