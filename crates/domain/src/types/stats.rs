//! Statistics types for transformation and API usage accounting

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::NormalizedRecord;

/* -------------------------------------------------------------------------- */
/* Transformation Statistics */
/* -------------------------------------------------------------------------- */

/// Aggregate counts for one batch transformation.
///
/// Invariant: `valid_records + invalid_records == total_records`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformationStats {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    /// Records that transformed successfully AND carried a repeated key.
    pub duplicates_detected: usize,
    /// How many records produced each normalized field.
    pub field_transformations: HashMap<String, usize>,
    /// Per-record failure messages, prefixed with the record's index.
    pub validation_errors: Vec<String>,
}

/// Output of a batch transformation: the surviving records plus stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformedBatch {
    pub records: Vec<NormalizedRecord>,
    pub stats: TransformationStats,
}

/* -------------------------------------------------------------------------- */
/* API Usage Accounting */
/* -------------------------------------------------------------------------- */

/// One API call as observed by the usage tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallRecord {
    pub timestamp: DateTime<Utc>,
    /// Entity set or endpoint label.
    pub resource: String,
    pub records_retrieved: usize,
    pub duration_ms: u64,
    pub success: bool,
}

/// Rolled-up API usage over a lookback window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageReport {
    pub window_hours: i64,
    pub total_calls: usize,
    pub successful_calls: usize,
    pub failed_calls: usize,
    pub total_records: usize,
    /// Fraction of calls that succeeded; 1.0 for an empty window.
    pub success_rate: f64,
}
