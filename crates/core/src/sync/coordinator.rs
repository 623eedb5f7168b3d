//! Incremental sync coordinator
//!
//! Plans and drives time-windowed fetches across resources in priority
//! order, tracking the newest modification timestamp seen so the next
//! run can start where this one ended.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use listflow_domain::{
    AlertEvent, BatchRequest, BatchSyncReport, ListflowError, RawRecord, ResourceKind,
    ResourceSyncOutcome, SyncConfig, SyncRunCounts, SyncRunStatus,
};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::ports::{AlertSink, FeedQuery, ListingFeed, ListingStore};

/// Timestamp layout the feed expects inside `$filter` expressions.
const FILTER_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Coordinates incremental synchronization against the listing feed.
pub struct SyncCoordinator {
    feed: Arc<dyn ListingFeed>,
    store: Arc<dyn ListingStore>,
    alerts: Arc<dyn AlertSink>,
    config: SyncConfig,
    api_calls: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(
        feed: Arc<dyn ListingFeed>,
        store: Arc<dyn ListingStore>,
        alerts: Arc<dyn AlertSink>,
        config: SyncConfig,
    ) -> Self {
        Self { feed, store, alerts, config, api_calls: AtomicU64::new(0) }
    }

    /// Build the `$filter` expression for an incremental fetch.
    ///
    /// Without a watermark this is the additional filter verbatim (or
    /// empty: a full sync has no timestamp constraint).
    pub fn build_incremental_filter(
        &self,
        watermark: Option<DateTime<Utc>>,
        additional_filter: Option<&str>,
    ) -> String {
        let mut filters = Vec::new();

        if let Some(ts) = watermark {
            filters.push(format!(
                "{} gt {}",
                self.config.incremental_field,
                ts.format(FILTER_TIMESTAMP_FORMAT)
            ));
        }

        if let Some(additional) = additional_filter {
            if !additional.is_empty() {
                filters.push(additional.to_string());
            }
        }

        filters.join(" and ")
    }

    /// Plan one request per resource, sorted by priority (stable on
    /// input order for equal ranks).
    pub fn create_batch_requests(
        &self,
        resources: &[ResourceKind],
        watermark: Option<DateTime<Utc>>,
        custom_filters: Option<&HashMap<ResourceKind, String>>,
    ) -> Vec<BatchRequest> {
        let mut requests: Vec<BatchRequest> = resources
            .iter()
            .map(|&resource| {
                let additional =
                    custom_filters.and_then(|filters| filters.get(&resource)).map(String::as_str);
                BatchRequest {
                    resource,
                    filter_expr: self.build_incremental_filter(watermark, additional),
                    select_fields: Some(
                        resource.default_select_fields().iter().map(|s| s.to_string()).collect(),
                    ),
                    priority: resource.priority(),
                }
            })
            .collect();

        requests.sort_by_key(|r| r.priority);
        requests
    }

    /// The stored watermark, or `None` when unavailable. Store failures
    /// degrade to a full sync rather than aborting.
    pub async fn last_sync_watermark(&self) -> Option<DateTime<Utc>> {
        match self.store.last_sync_watermark().await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %e, "failed to read last sync watermark");
                None
            }
        }
    }

    /// Whether an incremental sync is worthwhile: requires a watermark
    /// no older than the configured age bound.
    pub fn should_use_incremental(&self, watermark: Option<DateTime<Utc>>) -> bool {
        match watermark {
            Some(ts) => Utc::now() - ts < Duration::hours(self.config.max_age_hours),
            None => false,
        }
    }

    /// Sync a single resource: fetch all pages and track the newest
    /// modification timestamp observed.
    ///
    /// Fetch failures are recorded in the outcome, not raised.
    #[instrument(skip(self, additional_filter, select_fields))]
    pub async fn execute_incremental_sync(
        &self,
        resource: ResourceKind,
        watermark: Option<DateTime<Utc>>,
        additional_filter: Option<&str>,
        select_fields: Option<Vec<String>>,
    ) -> ResourceSyncOutcome {
        let (outcome, _records) =
            self.fetch_resource(resource, watermark, additional_filter, select_fields).await;
        outcome
    }

    /// Fetch one resource and return both the outcome and the raw
    /// records, so pipeline callers can transform without refetching.
    pub(crate) async fn fetch_resource(
        &self,
        resource: ResourceKind,
        watermark: Option<DateTime<Utc>>,
        additional_filter: Option<&str>,
        select_fields: Option<Vec<String>>,
    ) -> (ResourceSyncOutcome, Vec<RawRecord>) {
        let mut outcome = ResourceSyncOutcome::new(resource);

        let filter_expr = self.build_incremental_filter(watermark, additional_filter);
        let select = select_fields.unwrap_or_else(|| {
            resource.default_select_fields().iter().map(|s| s.to_string()).collect()
        });

        let filter_display =
            if filter_expr.is_empty() { "<full sync>" } else { filter_expr.as_str() };
        info!(%resource, filter = filter_display, "starting incremental sync");

        let query = FeedQuery {
            filter: (!filter_expr.is_empty()).then_some(filter_expr),
            select: Some(select),
            top: Some(self.config.page_size),
            orderby: None,
            max_pages: None,
        };

        let records = match self.feed.fetch_all_pages(resource, query).await {
            Ok(records) => records,
            Err(e) => {
                error!(%resource, error = %e, "incremental sync failed");
                self.emit_fetch_alert(&e).await;
                outcome.success = false;
                outcome.errors.push(e.to_string());
                return (outcome, Vec::new());
            }
        };

        self.api_calls.fetch_add(1, Ordering::SeqCst);

        outcome.records_fetched = records.len();
        outcome.records_processed = records.len();
        outcome.last_modification_timestamp = self.scan_max_watermark(&records);
        outcome.api_calls_made = self.api_calls.load(Ordering::SeqCst);

        info!(%resource, fetched = outcome.records_fetched, "incremental sync completed");

        (outcome, records)
    }

    /// Newest watermark-field timestamp across the fetched records.
    /// Unparseable values are skipped rather than failing the sync.
    fn scan_max_watermark(&self, records: &[RawRecord]) -> Option<DateTime<Utc>> {
        records
            .iter()
            .filter_map(|record| record.get(self.config.incremental_field.as_str()))
            .filter_map(|value| value.as_str())
            .filter_map(parse_watermark)
            .max()
    }

    /// Sync multiple resources sequentially in priority order and record
    /// the run with the store.
    ///
    /// The report is always returned, even under partial failure; the
    /// stored watermark only advances when every resource succeeded.
    #[instrument(skip(self, custom_filters))]
    pub async fn execute_batched_sync(
        &self,
        resources: &[ResourceKind],
        use_incremental: bool,
        custom_filters: Option<HashMap<ResourceKind, String>>,
    ) -> BatchSyncReport {
        let mut report =
            BatchSyncReport::new(Uuid::now_v7().to_string(), Utc::now());

        let watermark = if use_incremental {
            let watermark = self.last_sync_watermark().await;
            match watermark {
                Some(ts) => info!(watermark = %ts, "using incremental sync"),
                None => info!("no previous sync found, performing full sync"),
            }
            watermark
        } else {
            None
        };

        let requests = self.create_batch_requests(resources, watermark, custom_filters.as_ref());

        self.reset_api_calls();

        for request in requests {
            let additional = custom_filters
                .as_ref()
                .and_then(|filters| filters.get(&request.resource))
                .map(String::as_str);

            let outcome = self
                .execute_incremental_sync(
                    request.resource,
                    watermark,
                    additional,
                    request.select_fields.clone(),
                )
                .await;

            report.total_records_processed += outcome.records_processed;
            report.results.push(outcome);
        }

        report.total_api_calls = self.api_calls_made();
        report.finished_at = Some(Utc::now());

        self.record_report(&report).await;

        info!(
            resources = resources.len(),
            api_calls = report.total_api_calls,
            records = report.total_records_processed,
            duration_seconds = report.duration_seconds(),
            "batched sync completed"
        );

        report
    }

    /// Record a finished run with the store. A failed run never
    /// advances the watermark.
    pub(crate) async fn record_report(&self, report: &BatchSyncReport) {
        let counts = SyncRunCounts {
            records_fetched: report.results.iter().map(|r| r.records_fetched).sum(),
            records_processed: report.total_records_processed,
            api_calls: report.total_api_calls,
        };

        let status = run_status(report);
        let errors: Vec<String> =
            report.results.iter().flat_map(|r| r.errors.iter().cloned()).collect();
        let error_message = (!errors.is_empty()).then(|| errors.join("; "));
        let new_watermark = report.all_successful().then(|| report.max_watermark()).flatten();

        if let Err(e) = self
            .store
            .record_run_outcome(counts, status, error_message.as_deref(), new_watermark)
            .await
        {
            warn!(error = %e, "failed to record sync run outcome");
        }
    }

    /// Page size that fits an estimated fetch into the remaining call
    /// budget: `0` when the quota is exhausted, the maximum batch size
    /// when the budget is generous, otherwise the smallest page size
    /// whose page count still fits.
    pub fn calculate_optimal_batch_size(
        estimated_records: u64,
        quota_remaining: u64,
        max_batch_size: u64,
    ) -> u64 {
        if quota_remaining == 0 {
            return 0;
        }

        let pages_needed = estimated_records.div_ceil(max_batch_size.max(1));
        if pages_needed <= quota_remaining {
            return max_batch_size;
        }

        estimated_records.div_ceil(quota_remaining).min(max_batch_size)
    }

    /// API calls made since the last reset.
    pub fn api_calls_made(&self) -> u64 {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn reset_api_calls(&self) {
        self.api_calls.store(0, Ordering::SeqCst);
    }

    pub(crate) fn store(&self) -> &Arc<dyn ListingStore> {
        &self.store
    }

    async fn emit_fetch_alert(&self, error: &ListflowError) {
        let event = match error {
            ListflowError::Auth(message) => Some(AlertEvent::authentication_failure(message)),
            ListflowError::RateLimited { retries } => {
                Some(AlertEvent::rate_limit_exhausted(*retries))
            }
            _ => None,
        };

        if let Some(event) = event {
            if let Err(e) = self.alerts.emit(event).await {
                warn!(error = %e, "failed to emit alert");
            }
        }
    }
}

/// Parse a watermark value defensively: RFC 3339 first, then the
/// zone-less ISO shape, which is taken as UTC.
fn parse_watermark(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn run_status(report: &BatchSyncReport) -> SyncRunStatus {
    if report.all_successful() {
        SyncRunStatus::Completed
    } else if report.results.iter().any(|r| r.success) {
        SyncRunStatus::CompletedWithErrors
    } else {
        SyncRunStatus::Failed
    }
}
