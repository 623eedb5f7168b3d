//! Port interfaces for sync operations

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listflow_domain::{
    AlertEvent, NormalizedRecord, RawRecord, ResourceKind, Result, SyncRunCounts, SyncRunStatus,
    UpsertOutcome,
};

/// Query parameters for one paginated feed fetch.
#[derive(Debug, Clone, Default)]
pub struct FeedQuery {
    /// OData `$filter` expression, passed through verbatim.
    pub filter: Option<String>,
    /// Fields for `$select`; joined with commas on the wire.
    pub select: Option<Vec<String>>,
    /// Requested page size; the client clamps to the protocol maximum.
    pub top: Option<u32>,
    /// OData `$orderby` expression, passed through verbatim.
    pub orderby: Option<String>,
    /// Stop after this many page fetches even if more pages exist.
    pub max_pages: Option<usize>,
}

/// Trait for the upstream listing feed (the OData API client).
#[async_trait]
pub trait ListingFeed: Send + Sync {
    /// Fetch every page for one resource and concatenate the records in
    /// server-delivered order.
    async fn fetch_all_pages(
        &self,
        resource: ResourceKind,
        query: FeedQuery,
    ) -> Result<Vec<RawRecord>>;
}

/// Trait for the durable store holding listings and sync metadata.
///
/// Upsert semantics and schema are the implementation's concern.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Timestamp of the newest record processed by the last successful
    /// run, or `None` when no run has completed.
    async fn last_sync_watermark(&self) -> Result<Option<DateTime<Utc>>>;

    /// Insert-or-update records by key.
    async fn upsert_batch(&self, records: &[NormalizedRecord]) -> Result<UpsertOutcome>;

    /// Listing keys already present in the store, for duplicate checks.
    async fn existing_keys(&self, resource: ResourceKind) -> Result<HashSet<String>>;

    /// Record the outcome of a run. `new_watermark` is only supplied
    /// after a fully successful run; the stored watermark must never
    /// move backwards.
    async fn record_run_outcome(
        &self,
        counts: SyncRunCounts,
        status: SyncRunStatus,
        error_message: Option<&str>,
        new_watermark: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Trait for the alert delivery collaborator.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, event: AlertEvent) -> Result<()>;
}
