//! API usage tracker
//!
//! Keeps a bounded in-memory history of API calls and the latest quota
//! snapshot, raising alert events when usage crosses the configured
//! thresholds.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{Duration, Utc};
use listflow_domain::{
    AlertEvent, AlertSeverity, ApiCallRecord, QuotaSnapshot, QuotaWindowKind, UsageReport,
};
use tracing::warn;

use crate::sync::ports::AlertSink;

const DEFAULT_WARNING_THRESHOLD: f64 = 0.80;
const DEFAULT_CRITICAL_THRESHOLD: f64 = 0.95;
const MAX_CALL_HISTORY: usize = 10_000;

/// Tracks API call volume and quota pressure for one process.
pub struct UsageTracker {
    calls: VecDeque<ApiCallRecord>,
    quota: QuotaSnapshot,
    warning_threshold: f64,
    critical_threshold: f64,
    alerts: Option<Arc<dyn AlertSink>>,
}

impl Default for UsageTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WARNING_THRESHOLD, DEFAULT_CRITICAL_THRESHOLD)
    }
}

impl UsageTracker {
    pub fn new(warning_threshold: f64, critical_threshold: f64) -> Self {
        Self {
            calls: VecDeque::new(),
            quota: QuotaSnapshot::default(),
            warning_threshold,
            critical_threshold,
            alerts: None,
        }
    }

    /// Attach an alert sink; threshold breaches are emitted through it.
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Record one completed API call. History is bounded; the oldest
    /// entries are dropped first.
    pub fn record_call(
        &mut self,
        resource: &str,
        records_retrieved: usize,
        duration_ms: u64,
        success: bool,
    ) {
        if self.calls.len() == MAX_CALL_HISTORY {
            self.calls.pop_front();
        }
        self.calls.push_back(ApiCallRecord {
            timestamp: Utc::now(),
            resource: resource.to_string(),
            records_retrieved,
            duration_ms,
            success,
        });
    }

    /// Store the latest quota snapshot and emit threshold alerts.
    pub async fn update_quota(&mut self, snapshot: QuotaSnapshot) {
        self.quota = snapshot;

        let breaches = self.threshold_breaches();
        if let Some(alerts) = &self.alerts {
            for event in breaches {
                if let Err(e) = alerts.emit(event).await {
                    warn!(error = %e, "failed to emit quota alert");
                }
            }
        }
    }

    /// The most recent quota snapshot.
    pub fn quota(&self) -> &QuotaSnapshot {
        &self.quota
    }

    /// Per-window low-quota flags; windows with unknown limits are
    /// omitted.
    pub fn check_quota_limits(&self, threshold: f64) -> HashMap<QuotaWindowKind, bool> {
        self.quota.approaching_limit(threshold)
    }

    /// Whether operations should pause: any window at or past the
    /// critical usage threshold.
    pub fn should_pause(&self) -> bool {
        QuotaWindowKind::ALL.iter().any(|&kind| {
            self.quota
                .window(kind)
                .usage_fraction()
                .is_some_and(|usage| usage >= self.critical_threshold)
        })
    }

    /// Roll up call history over the given lookback window.
    pub fn usage_report(&self, window_hours: i64) -> UsageReport {
        let cutoff = Utc::now() - Duration::hours(window_hours);
        let recent: Vec<&ApiCallRecord> =
            self.calls.iter().filter(|c| c.timestamp >= cutoff).collect();

        let total_calls = recent.len();
        let successful_calls = recent.iter().filter(|c| c.success).count();
        let total_records = recent.iter().map(|c| c.records_retrieved).sum();

        UsageReport {
            window_hours,
            total_calls,
            successful_calls,
            failed_calls: total_calls - successful_calls,
            total_records,
            success_rate: if total_calls == 0 {
                1.0
            } else {
                successful_calls as f64 / total_calls as f64
            },
        }
    }

    fn threshold_breaches(&self) -> Vec<AlertEvent> {
        let mut events = Vec::new();
        for kind in QuotaWindowKind::ALL {
            let Some(usage) = self.quota.window(kind).usage_fraction() else {
                continue;
            };
            if usage >= self.critical_threshold {
                events.push(AlertEvent::quota_threshold(
                    kind.as_str(),
                    usage,
                    AlertSeverity::Critical,
                ));
            } else if usage >= self.warning_threshold {
                events.push(AlertEvent::quota_threshold(
                    kind.as_str(),
                    usage,
                    AlertSeverity::Warning,
                ));
            }
        }
        events
    }
}
