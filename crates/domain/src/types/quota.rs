//! API quota tracking types
//!
//! The upstream reports per-window call budgets through response headers.
//! A [`QuotaSnapshot`] is overwritten after every response that carries
//! quota headers; it lives for the process lifetime only.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single quota counter as reported by the upstream.
///
/// Header values that fail to parse as integers are retained verbatim
/// rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum QuotaReading {
    Count(u64),
    Raw(String),
}

impl QuotaReading {
    /// Parse a header value, falling back to the raw string.
    pub fn parse(value: &str) -> Self {
        match value.trim().parse::<u64>() {
            Ok(count) => Self::Count(count),
            Err(_) => Self::Raw(value.to_string()),
        }
    }

    /// Numeric value, when the upstream sent one.
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(c) => Some(*c),
            Self::Raw(_) => None,
        }
    }
}

/// Limit and remaining counters for one quota window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaWindow {
    pub limit: Option<QuotaReading>,
    pub remaining: Option<QuotaReading>,
}

impl QuotaWindow {
    /// Fraction of the window still available, when both counters are
    /// known and numeric. A zero limit yields `None`.
    pub fn remaining_fraction(&self) -> Option<f64> {
        let limit = self.limit.as_ref()?.count()?;
        let remaining = self.remaining.as_ref()?.count()?;
        if limit == 0 {
            return None;
        }
        Some(remaining as f64 / limit as f64)
    }

    /// Fraction of the window consumed, when known.
    pub fn usage_fraction(&self) -> Option<f64> {
        self.remaining_fraction().map(|r| 1.0 - r)
    }
}

/// The three budget windows tracked by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaWindowKind {
    Minute,
    Hour,
    Daily,
}

impl QuotaWindowKind {
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Daily];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Daily => "daily",
        }
    }
}

/// Per-window quota state parsed from the most recent response headers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub minute: QuotaWindow,
    pub hour: QuotaWindow,
    pub daily: QuotaWindow,
    pub updated_at: Option<DateTime<Utc>>,
}

impl QuotaSnapshot {
    pub fn window(&self, kind: QuotaWindowKind) -> &QuotaWindow {
        match kind {
            QuotaWindowKind::Minute => &self.minute,
            QuotaWindowKind::Hour => &self.hour,
            QuotaWindowKind::Daily => &self.daily,
        }
    }

    pub fn window_mut(&mut self, kind: QuotaWindowKind) -> &mut QuotaWindow {
        match kind {
            QuotaWindowKind::Minute => &mut self.minute,
            QuotaWindowKind::Hour => &mut self.hour,
            QuotaWindowKind::Daily => &mut self.daily,
        }
    }

    /// Per-window low-quota flags: `remaining / limit <= threshold`.
    ///
    /// Windows without known numeric counters are omitted from the
    /// result rather than defaulting either way.
    pub fn approaching_limit(&self, threshold: f64) -> HashMap<QuotaWindowKind, bool> {
        let mut flags = HashMap::new();
        for kind in QuotaWindowKind::ALL {
            if let Some(remaining) = self.window(kind).remaining_fraction() {
                flags.insert(kind, remaining <= threshold);
            }
        }
        flags
    }
}
