//! Domain types and models

pub mod alerts;
pub mod quota;
pub mod record;
pub mod stats;
pub mod sync;

pub use alerts::{AlertEvent, AlertKind, AlertSeverity};
pub use quota::{QuotaReading, QuotaSnapshot, QuotaWindow, QuotaWindowKind};
pub use record::{FieldValue, NormalizedRecord, RawRecord};
pub use stats::{ApiCallRecord, TransformationStats, TransformedBatch, UsageReport};
pub use sync::{
    BatchRequest, BatchSyncReport, ResourceKind, ResourceSyncOutcome, SyncRunCounts,
    SyncRunStatus, UpsertOutcome,
};
