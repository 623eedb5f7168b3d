//! End-to-end ETL pipeline
//!
//! Composes the sync coordinator with the record transformer and the
//! persistence port: fetch all pages, normalize and validate, upsert,
//! then record the run and its watermark.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use listflow_domain::{BatchSyncReport, ResourceKind};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::coordinator::SyncCoordinator;
use crate::transform::transformer::RecordTransformer;

/// Resources synced when the caller does not ask for more. Ancillary
/// resources are opt-in; the transformer's required-field schema is
/// keyed to the primary listing entity.
pub const DEFAULT_RESOURCES: &[ResourceKind] = &[ResourceKind::Property];

/// Result of one full pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineRunSummary {
    pub report: BatchSyncReport,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub invalid_records: usize,
    pub duplicates_detected: usize,
}

/// Drives fetch, transform, and upsert for a set of resources.
pub struct EtlPipeline {
    coordinator: SyncCoordinator,
    transformer: Mutex<RecordTransformer>,
}

impl EtlPipeline {
    pub fn new(coordinator: SyncCoordinator) -> Self {
        Self { coordinator, transformer: Mutex::new(RecordTransformer::new()) }
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Run the pipeline for the given resources.
    ///
    /// Per-resource failures are isolated into the report; the stored
    /// watermark only advances when every resource succeeded.
    #[instrument(skip(self, custom_filters))]
    pub async fn run(
        &self,
        resources: &[ResourceKind],
        use_incremental: bool,
        custom_filters: Option<HashMap<ResourceKind, String>>,
    ) -> PipelineRunSummary {
        let mut report = BatchSyncReport::new(Uuid::now_v7().to_string(), Utc::now());
        let mut summary_inserted = 0;
        let mut summary_updated = 0;
        let mut summary_invalid = 0;
        let mut summary_duplicates = 0;

        let watermark = if use_incremental {
            self.coordinator.last_sync_watermark().await
        } else {
            None
        };

        let requests =
            self.coordinator.create_batch_requests(resources, watermark, custom_filters.as_ref());

        self.coordinator.reset_api_calls();

        for request in requests {
            let additional = custom_filters
                .as_ref()
                .and_then(|filters| filters.get(&request.resource))
                .map(String::as_str);

            let (mut outcome, records) = self
                .coordinator
                .fetch_resource(request.resource, watermark, additional, request.select_fields)
                .await;

            if outcome.success && !records.is_empty() {
                let existing_keys = match self
                    .coordinator
                    .store()
                    .existing_keys(request.resource)
                    .await
                {
                    Ok(keys) => Some(keys),
                    Err(e) => {
                        warn!(resource = %request.resource, error = %e, "existing-key lookup failed");
                        None
                    }
                };

                let transformed = {
                    let mut transformer =
                        self.transformer.lock().unwrap_or_else(|e| e.into_inner());
                    transformer.transform_batch(&records, existing_keys.as_ref(), true)
                };

                match transformed {
                    Ok(batch) => {
                        info!(
                            resource = %request.resource,
                            total = batch.stats.total_records,
                            valid = batch.stats.valid_records,
                            invalid = batch.stats.invalid_records,
                            duplicates = batch.stats.duplicates_detected,
                            "transformation completed"
                        );
                        summary_invalid += batch.stats.invalid_records;
                        summary_duplicates += batch.stats.duplicates_detected;

                        if !batch.records.is_empty() {
                            match self.coordinator.store().upsert_batch(&batch.records).await {
                                Ok(upsert) => {
                                    summary_inserted += upsert.inserted;
                                    summary_updated += upsert.updated;
                                    outcome.errors.extend(upsert.errors);
                                }
                                Err(e) => {
                                    warn!(resource = %request.resource, error = %e, "upsert failed");
                                    outcome.success = false;
                                    outcome.errors.push(e.to_string());
                                }
                            }
                        }
                    }
                    // transform_batch only fails when continue_on_error is
                    // off; keep the arm for completeness.
                    Err(e) => {
                        outcome.success = false;
                        outcome.errors.push(e.to_string());
                    }
                }
            }

            report.total_records_processed += outcome.records_processed;
            report.results.push(outcome);
        }

        report.total_api_calls = self.coordinator.api_calls_made();
        report.finished_at = Some(Utc::now());

        self.coordinator.record_report(&report).await;

        info!(
            run_id = %report.run_id,
            records = report.total_records_processed,
            inserted = summary_inserted,
            updated = summary_updated,
            invalid = summary_invalid,
            duration_seconds = report.duration_seconds(),
            "pipeline run completed"
        );

        PipelineRunSummary {
            report,
            records_inserted: summary_inserted,
            records_updated: summary_updated,
            invalid_records: summary_invalid,
            duplicates_detected: summary_duplicates,
        }
    }
}
