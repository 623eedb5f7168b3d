//! Hand-rolled port fakes shared by the sync unit tests.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listflow_domain::{
    AlertEvent, ListflowError, NormalizedRecord, RawRecord, ResourceKind, Result, SyncRunCounts,
    SyncRunStatus, UpsertOutcome,
};
use serde_json::json;

use super::ports::{AlertSink, FeedQuery, ListingFeed, ListingStore};

/// Feed returning the same canned records for every resource.
#[derive(Default)]
pub(crate) struct StaticFeed {
    records: Vec<RawRecord>,
}

impl StaticFeed {
    /// One well-formed property record per timestamp value.
    pub(crate) fn with_timestamps(timestamps: &[&str]) -> Self {
        let records = timestamps
            .iter()
            .enumerate()
            .map(|(i, ts)| {
                json!({
                    "ListingKey": format!("L{i}"),
                    "ListPrice": 250_000 + i as i64,
                    "ModificationTimestamp": ts,
                })
                .as_object()
                .cloned()
                .unwrap_or_default()
            })
            .collect();
        Self { records }
    }
}

#[async_trait]
impl ListingFeed for StaticFeed {
    async fn fetch_all_pages(
        &self,
        _resource: ResourceKind,
        _query: FeedQuery,
    ) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}

/// Feed failing every fetch with a fixed error.
pub(crate) struct FailingFeed {
    error: ListflowError,
}

impl FailingFeed {
    pub(crate) fn new(error: ListflowError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl ListingFeed for FailingFeed {
    async fn fetch_all_pages(
        &self,
        _resource: ResourceKind,
        _query: FeedQuery,
    ) -> Result<Vec<RawRecord>> {
        Err(self.error.clone())
    }
}

/// Store stub recording run outcomes and upserts in memory.
#[derive(Default)]
pub(crate) struct StubStore {
    pub(crate) watermark: Option<DateTime<Utc>>,
    runs: Mutex<Vec<RecordedRun>>,
    upserted: Mutex<Vec<NormalizedRecord>>,
}

#[derive(Debug, Clone)]
pub(crate) struct RecordedRun {
    pub(crate) counts: SyncRunCounts,
    pub(crate) status: SyncRunStatus,
    pub(crate) error_message: Option<String>,
    pub(crate) new_watermark: Option<DateTime<Utc>>,
}

impl StubStore {
    pub(crate) fn with_watermark(watermark: DateTime<Utc>) -> Self {
        Self { watermark: Some(watermark), ..Self::default() }
    }

    pub(crate) fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub(crate) fn upserted(&self) -> Vec<NormalizedRecord> {
        self.upserted.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ListingStore for StubStore {
    async fn last_sync_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.watermark)
    }

    async fn upsert_batch(&self, records: &[NormalizedRecord]) -> Result<UpsertOutcome> {
        self.upserted.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(records);
        Ok(UpsertOutcome { inserted: records.len(), updated: 0, errors: Vec::new() })
    }

    async fn record_run_outcome(
        &self,
        counts: SyncRunCounts,
        status: SyncRunStatus,
        error_message: Option<&str>,
        new_watermark: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).push(RecordedRun {
            counts,
            status,
            error_message: error_message.map(String::from),
            new_watermark,
        });
        Ok(())
    }

    async fn existing_keys(&self, _resource: ResourceKind) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }
}

/// Alert sink collecting every emitted event.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<AlertEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    async fn emit(&self, event: AlertEvent) -> Result<()> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
        Ok(())
    }
}
