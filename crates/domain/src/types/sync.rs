//! Sync planning and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical data types served by the listing feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Property,
    Media,
    Member,
    Office,
}

impl ResourceKind {
    pub const ALL: [Self; 4] = [Self::Property, Self::Media, Self::Member, Self::Office];

    /// OData entity set name on the wire.
    pub fn entity_set(&self) -> &'static str {
        match self {
            Self::Property => "Property",
            Self::Media => "Media",
            Self::Member => "Member",
            Self::Office => "Office",
        }
    }

    /// Fixed sync priority. Lower ranks first; the primary entity type
    /// outranks ancillary ones.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Property => 0,
            Self::Media => 1,
            Self::Member => 2,
            Self::Office => 3,
        }
    }

    /// Default field-selection list for this resource.
    pub fn default_select_fields(&self) -> &'static [&'static str] {
        match self {
            Self::Property => &[
                "ListingKey",
                "ListPrice",
                "PropertyType",
                "BedroomsTotal",
                "BathroomsTotalInteger",
                "LivingArea",
                "LotSizeAcres",
                "YearBuilt",
                "StandardStatus",
                "ModificationTimestamp",
                "StreetNumber",
                "StreetName",
                "City",
                "StateOrProvince",
                "PostalCode",
            ],
            Self::Media => &[
                "MediaKey",
                "ResourceRecordKey",
                "MediaURL",
                "MediaType",
                "Order",
                "ModificationTimestamp",
            ],
            Self::Member => &[
                "MemberKey",
                "MemberFirstName",
                "MemberLastName",
                "MemberEmail",
                "ModificationTimestamp",
            ],
            Self::Office => &[
                "OfficeKey",
                "OfficeName",
                "OfficePhone",
                "OfficeEmail",
                "ModificationTimestamp",
            ],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.entity_set())
    }
}

/// One planned API call within a batched sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub resource: ResourceKind,
    /// Combined incremental + custom filter; empty string means
    /// unfiltered (full sync).
    pub filter_expr: String,
    pub select_fields: Option<Vec<String>>,
    pub priority: u8,
}

/// Result of syncing a single resource. Failures are recorded here
/// rather than propagated, isolating them from sibling resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSyncOutcome {
    pub resource: ResourceKind,
    pub records_fetched: usize,
    pub records_processed: usize,
    pub api_calls_made: u64,
    /// Newest modification timestamp observed; candidate watermark.
    pub last_modification_timestamp: Option<DateTime<Utc>>,
    pub errors: Vec<String>,
    pub success: bool,
}

impl ResourceSyncOutcome {
    pub fn new(resource: ResourceKind) -> Self {
        Self {
            resource,
            records_fetched: 0,
            records_processed: 0,
            api_calls_made: 0,
            last_modification_timestamp: None,
            errors: Vec::new(),
            success: true,
        }
    }
}

/// Aggregate result of a batched sync across multiple resources.
///
/// Always returned, even under partial failure; callers inspect
/// per-resource success flags rather than relying on an error path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSyncReport {
    pub run_id: String,
    /// Per-resource outcomes in execution (priority) order.
    pub results: Vec<ResourceSyncOutcome>,
    pub total_api_calls: u64,
    pub total_records_processed: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchSyncReport {
    pub fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            results: Vec::new(),
            total_api_calls: 0,
            total_records_processed: 0,
            started_at,
            finished_at: None,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self.finished_at {
            Some(finished) => {
                (finished - self.started_at).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    pub fn all_successful(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }

    pub fn outcome(&self, resource: ResourceKind) -> Option<&ResourceSyncOutcome> {
        self.results.iter().find(|r| r.resource == resource)
    }

    /// Newest candidate watermark across all successful resources.
    pub fn max_watermark(&self) -> Option<DateTime<Utc>> {
        self.results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.last_modification_timestamp)
            .max()
    }
}

/// What the persistence collaborator reports back from an upsert.
///
/// The inserted/updated split is advisory: stores without key tracking
/// may approximate it, and the core never derives logic from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}

/// Terminal status of one sync run as recorded with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Completed,
    CompletedWithErrors,
    Failed,
}

/// Aggregate counts recorded with the store at the end of a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SyncRunCounts {
    pub records_fetched: usize,
    pub records_processed: usize,
    pub api_calls: u64,
}
