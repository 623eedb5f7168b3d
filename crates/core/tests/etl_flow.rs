//! Cross-module flow tests: transformer output feeding the coordinator
//! contract, exercised through the public API with hand-rolled ports.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use listflow_core::{
    AlertSink, EtlPipeline, FeedQuery, ListingFeed, ListingStore, RecordTransformer,
    SyncCoordinator,
};
use listflow_domain::{
    AlertEvent, NormalizedRecord, RawRecord, ResourceKind, Result, SyncConfig, SyncRunCounts,
    SyncRunStatus, UpsertOutcome,
};
use serde_json::json;

struct PagedFeed {
    records: Vec<RawRecord>,
}

impl PagedFeed {
    fn property(key: &str, ts: &str) -> RawRecord {
        json!({
            "ListingKey": key,
            "ListPrice": 325_000,
            "ModificationTimestamp": ts,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }
}

#[async_trait]
impl ListingFeed for PagedFeed {
    async fn fetch_all_pages(
        &self,
        _resource: ResourceKind,
        _query: FeedQuery,
    ) -> Result<Vec<RawRecord>> {
        Ok(self.records.clone())
    }
}

#[derive(Default)]
struct CapturingStore {
    watermark: Mutex<Option<DateTime<Utc>>>,
    upserted: Mutex<Vec<NormalizedRecord>>,
    statuses: Mutex<Vec<SyncRunStatus>>,
}

#[async_trait]
impl ListingStore for CapturingStore {
    async fn last_sync_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(*self.watermark.lock().unwrap())
    }

    async fn upsert_batch(&self, records: &[NormalizedRecord]) -> Result<UpsertOutcome> {
        self.upserted.lock().unwrap().extend_from_slice(records);
        Ok(UpsertOutcome { inserted: records.len(), updated: 0, errors: Vec::new() })
    }

    async fn existing_keys(&self, _resource: ResourceKind) -> Result<HashSet<String>> {
        Ok(HashSet::new())
    }

    async fn record_run_outcome(
        &self,
        _counts: SyncRunCounts,
        status: SyncRunStatus,
        _error_message: Option<&str>,
        new_watermark: Option<DateTime<Utc>>,
    ) -> Result<()> {
        if let Some(ts) = new_watermark {
            *self.watermark.lock().unwrap() = Some(ts);
        }
        self.statuses.lock().unwrap().push(status);
        Ok(())
    }
}

struct QuietSink;

#[async_trait]
impl AlertSink for QuietSink {
    async fn emit(&self, _event: AlertEvent) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn two_consecutive_runs_advance_the_watermark_monotonically() {
    let feed = Arc::new(PagedFeed {
        records: vec![
            PagedFeed::property("K1", "2024-05-01T10:00:00Z"),
            PagedFeed::property("K2", "2024-05-02T12:00:00Z"),
        ],
    });
    let store = Arc::new(CapturingStore::default());
    let pipeline = EtlPipeline::new(SyncCoordinator::new(
        feed.clone(),
        store.clone(),
        Arc::new(QuietSink),
        SyncConfig::default(),
    ));

    let first = pipeline.run(&[ResourceKind::Property], true, None).await;
    assert!(first.report.all_successful());
    let after_first = *store.watermark.lock().unwrap();
    assert_eq!(after_first, Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).single());

    // A second run over the same data cannot move the watermark back.
    let second = pipeline.run(&[ResourceKind::Property], true, None).await;
    assert!(second.report.all_successful());
    let after_second = *store.watermark.lock().unwrap();
    assert!(after_second >= after_first);
}

#[tokio::test]
async fn duplicate_keys_within_a_fetch_are_flagged_but_upserted() {
    let feed = Arc::new(PagedFeed {
        records: vec![
            PagedFeed::property("K1", "2024-05-01T10:00:00Z"),
            PagedFeed::property("K1", "2024-05-01T11:00:00Z"),
        ],
    });
    let store = Arc::new(CapturingStore::default());
    let pipeline = EtlPipeline::new(SyncCoordinator::new(
        feed,
        store.clone(),
        Arc::new(QuietSink),
        SyncConfig::default(),
    ));

    let summary = pipeline.run(&[ResourceKind::Property], false, None).await;

    assert_eq!(summary.duplicates_detected, 1);
    let upserted = store.upserted.lock().unwrap();
    assert_eq!(upserted.len(), 2);
    assert!(!upserted[0].is_duplicate);
    assert!(upserted[1].is_duplicate);
}

#[test]
fn transformer_stats_invariant_over_varied_shapes() {
    let mut transformer = RecordTransformer::new();

    let shapes: Vec<RawRecord> = vec![
        json!({"ListingKey": "A", "ModificationTimestamp": "2024-01-01T00:00:00Z"}),
        json!({"ListingKey": "B", "ModificationTimestamp": "01/02/2024"}),
        json!({"ListingKey": null, "ModificationTimestamp": "2024-01-01T00:00:00Z"}),
        json!({"ModificationTimestamp": "2024-01-01T00:00:00Z"}),
        json!({"ListingKey": "C", "ModificationTimestamp": "nonsense"}),
    ]
    .into_iter()
    .filter_map(|v| v.as_object().cloned())
    .collect();

    let batch = transformer.transform_batch(&shapes, None, true).unwrap();
    assert_eq!(batch.stats.total_records, 5);
    assert_eq!(
        batch.stats.valid_records + batch.stats.invalid_records,
        batch.stats.total_records
    );
    assert_eq!(batch.records.len(), batch.stats.valid_records);
    assert_eq!(batch.stats.valid_records, 2);
}
