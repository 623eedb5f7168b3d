//! Record transformer
//!
//! Combines field normalization, type coercion, required-field and
//! business-rule validation, and duplicate detection into the
//! per-record and per-batch transformation contract.

use std::collections::HashSet;

use chrono::{Datelike, Utc};
use listflow_domain::{
    FieldValue, ListflowError, NormalizedRecord, RawRecord, Result, TransformationStats,
    TransformedBatch,
};
use tracing::{error, warn};

use super::coerce::{coerce, TargetKind};
use super::normalizer::FieldNormalizer;

/// Fields every valid record must carry, with their expected kinds.
const REQUIRED_FIELDS: &[(&str, TargetKind)] =
    &[("listing_key", TargetKind::Text), ("modification_timestamp", TargetKind::Timestamp)];

const LIST_PRICE_SANITY_CAP: f64 = 1_000_000_000.0;
const BEDROOMS_SANITY_CAP: i64 = 50;
const YEAR_BUILT_FLOOR: i32 = 1800;

/// Expected semantic kind for a normalized field name.
///
/// Unknown fields fall outside this table and are carried as text.
fn schema_kind(field: &str) -> Option<TargetKind> {
    match field {
        "listing_key" => Some(TargetKind::Text),
        "list_price" => Some(TargetKind::Decimal),
        "property_type" => Some(TargetKind::Text),
        "bedrooms_total" => Some(TargetKind::Integer),
        "bathrooms_total" => Some(TargetKind::Decimal),
        "square_feet" => Some(TargetKind::Integer),
        "lot_size_acres" => Some(TargetKind::Decimal),
        "year_built" => Some(TargetKind::Integer),
        "listing_status" => Some(TargetKind::Text),
        "modification_timestamp" => Some(TargetKind::Timestamp),
        "street_address" => Some(TargetKind::Text),
        "city" => Some(TargetKind::Text),
        "state_or_province" => Some(TargetKind::Text),
        "postal_code" => Some(TargetKind::Text),
        _ => None,
    }
}

fn is_required(field: &str) -> bool {
    REQUIRED_FIELDS.iter().any(|(name, _)| *name == field)
}

/// Outcome of record-level validation.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Transforms raw feed records into normalized, validated records.
///
/// Holds the memoized field-name cache and the per-batch duplicate key
/// set. Not shareable across threads; hosts running concurrent batches
/// use one transformer per batch.
#[derive(Debug, Default)]
pub struct RecordTransformer {
    normalizer: FieldNormalizer,
    seen_keys: HashSet<String>,
}

impl RecordTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform a single raw record.
    ///
    /// Metadata keys (`@...`, `_...`) are skipped. Coercion failure on a
    /// required field fails the record; on any other field the value
    /// degrades to null with a logged warning.
    ///
    /// # Errors
    /// `ListflowError::Validation` when a required field is missing,
    /// null, mistyped, or a business rule is violated.
    pub fn transform_record(
        &mut self,
        raw: &RawRecord,
        existing_keys: Option<&HashSet<String>>,
    ) -> Result<NormalizedRecord> {
        let mut record = NormalizedRecord::new();

        for (api_field, value) in raw {
            if api_field.starts_with('@') || api_field.starts_with('_') {
                continue;
            }

            let db_field = match self.normalizer.normalize(api_field) {
                Ok(name) => name,
                Err(e) => {
                    warn!(field = %api_field, error = %e, "skipping unnormalizable field");
                    continue;
                }
            };

            match schema_kind(&db_field) {
                Some(kind) => match coerce(value, kind, api_field) {
                    Ok(coerced) => {
                        record.fields.insert(db_field, coerced);
                    }
                    Err(e) if is_required(&db_field) => {
                        return Err(ListflowError::Validation(format!(
                            "Required field conversion failed: {e}"
                        )));
                    }
                    Err(e) => {
                        warn!(field = %api_field, error = %e, "coercion failed, degrading to null");
                        record.fields.insert(db_field, FieldValue::Null);
                    }
                },
                None => match coerce(value, TargetKind::Text, api_field) {
                    Ok(coerced) => {
                        record.fields.insert(db_field, coerced);
                    }
                    Err(e) => {
                        warn!(field = %api_field, error = %e, "skipping unconvertible field");
                    }
                },
            }
        }

        let validation = self.validate_record(&record);
        if !validation.is_valid {
            return Err(ListflowError::Validation(format!(
                "Record validation failed: {}",
                validation.errors.join("; ")
            )));
        }
        for warning in &validation.warnings {
            warn!(warning = %warning, "record validation warning");
        }

        record.is_duplicate = self.detect_duplicate(&record, existing_keys);

        Ok(record)
    }

    /// Required-field and business-rule validation.
    pub fn validate_record(&self, record: &NormalizedRecord) -> ValidationOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        for (field, expected) in REQUIRED_FIELDS {
            match record.get(field) {
                None => errors.push(format!("Missing required field: {field}")),
                Some(FieldValue::Null) => errors.push(format!("Required field {field} is null")),
                Some(value) => {
                    let matches = match expected {
                        TargetKind::Text => matches!(value, FieldValue::Text(_)),
                        TargetKind::Timestamp => matches!(value, FieldValue::Timestamp(_)),
                        TargetKind::Integer => matches!(value, FieldValue::Integer(_)),
                        TargetKind::Decimal => matches!(value, FieldValue::Decimal(_)),
                        TargetKind::Flag => matches!(value, FieldValue::Flag(_)),
                    };
                    if !matches {
                        errors.push(format!(
                            "Field {field} has wrong type: expected {expected}"
                        ));
                    }
                }
            }
        }

        if let Some(price) = record.get("list_price").and_then(FieldValue::as_f64) {
            if price < 0.0 {
                errors.push("List price cannot be negative".to_string());
            } else if price > LIST_PRICE_SANITY_CAP {
                warnings.push(format!("List price seems unusually high: ${price:.2}"));
            }
        }

        if let Some(year) = record.get("year_built").and_then(FieldValue::as_integer) {
            let current_year = i64::from(Utc::now().year());
            if year < i64::from(YEAR_BUILT_FLOOR) {
                errors.push(format!("Year built too early: {year}"));
            } else if year > current_year + 5 {
                errors.push(format!("Year built too far in future: {year}"));
            }
        }

        if let Some(bedrooms) = record.get("bedrooms_total").and_then(FieldValue::as_integer) {
            if bedrooms < 0 {
                errors.push("Bedrooms cannot be negative".to_string());
            } else if bedrooms > BEDROOMS_SANITY_CAP {
                warnings.push(format!("Unusually high bedroom count: {bedrooms}"));
            }
        }

        ValidationOutcome { is_valid: errors.is_empty(), errors, warnings }
    }

    /// Key-identity duplicate detection.
    ///
    /// Records without a usable key are never duplicates. The first
    /// occurrence of a key registers it; later occurrences within the
    /// same uncleared session report true.
    pub fn detect_duplicate(
        &mut self,
        record: &NormalizedRecord,
        existing_keys: Option<&HashSet<String>>,
    ) -> bool {
        let Some(listing_key) = record.listing_key() else {
            return false;
        };

        if existing_keys.is_some_and(|keys| keys.contains(listing_key)) {
            return true;
        }

        if self.seen_keys.contains(listing_key) {
            return true;
        }

        self.seen_keys.insert(listing_key.to_string());
        false
    }

    /// Transform a batch of raw records.
    ///
    /// With `continue_on_error` every record failure is collected as an
    /// indexed message and processing continues; otherwise the first
    /// failure aborts the batch.
    ///
    /// # Errors
    /// Only when `continue_on_error` is false and a record fails.
    pub fn transform_batch(
        &mut self,
        raw_records: &[RawRecord],
        existing_keys: Option<&HashSet<String>>,
        continue_on_error: bool,
    ) -> Result<TransformedBatch> {
        let mut stats = TransformationStats::default();
        let mut records = Vec::new();

        // Duplicate state is scoped to one batch.
        self.clear_duplicate_cache();

        for (index, raw) in raw_records.iter().enumerate() {
            match self.transform_record(raw, existing_keys) {
                Ok(record) => {
                    for field in record.fields.keys() {
                        *stats.field_transformations.entry(field.clone()).or_insert(0) += 1;
                    }
                    records.push(record);
                }
                Err(e) => {
                    let message = format!("Record {index}: {e}");
                    error!(error = %message, "record transformation failed");
                    stats.validation_errors.push(message.clone());

                    if !continue_on_error {
                        return Err(ListflowError::Transform(format!(
                            "Batch transformation failed: {message}"
                        )));
                    }
                }
            }
        }

        stats.total_records = raw_records.len();
        stats.valid_records = records.len();
        stats.invalid_records = stats.total_records - stats.valid_records;
        stats.duplicates_detected = records.iter().filter(|r| r.is_duplicate).count();

        Ok(TransformedBatch { records, stats })
    }

    /// Clear the per-batch duplicate key set.
    pub fn clear_duplicate_cache(&mut self) {
        self.seen_keys.clear();
    }

    /// The memoized external-to-internal field name mapping.
    pub fn field_mapping(&self) -> &std::collections::HashMap<String, String> {
        self.normalizer.mapping()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap_or_default()
    }

    fn property(key: &str) -> RawRecord {
        raw(json!({
            "ListingKey": key,
            "ListPrice": "450,000",
            "BedroomsTotal": 3,
            "YearBuilt": 1995,
            "ModificationTimestamp": "2024-01-15T10:30:00Z",
            "City": "Austin",
        }))
    }

    #[test]
    fn transforms_a_well_formed_record() {
        let mut transformer = RecordTransformer::new();
        let record = transformer.transform_record(&property("L1"), None).unwrap();

        assert_eq!(record.listing_key(), Some("L1"));
        assert!(matches!(record.get("list_price"), Some(FieldValue::Decimal(_))));
        assert_eq!(record.get("bedrooms_total"), Some(&FieldValue::Integer(3)));
        assert!(matches!(record.get("modification_timestamp"), Some(FieldValue::Timestamp(_))));
        assert!(!record.is_duplicate);
    }

    #[test]
    fn skips_metadata_fields() {
        let mut transformer = RecordTransformer::new();
        let mut input = property("L1");
        input.insert("@odata.context".into(), json!("ctx"));
        input.insert("_internal".into(), json!("x"));

        let record = transformer.transform_record(&input, None).unwrap();
        assert!(record.fields.keys().all(|k| !k.starts_with('@') && !k.starts_with('_')));
        assert!(!record.fields.contains_key("odata_context"));
    }

    #[test]
    fn unknown_fields_become_text() {
        let mut transformer = RecordTransformer::new();
        let mut input = property("L1");
        input.insert("SomeVendorExtension".into(), json!(12345));

        let record = transformer.transform_record(&input, None).unwrap();
        assert_eq!(
            record.get("somevendorextension"),
            Some(&FieldValue::Text("12345".into()))
        );
    }

    #[test]
    fn optional_coercion_failure_degrades_to_null() {
        let mut transformer = RecordTransformer::new();
        let mut input = property("L1");
        input.insert("YearBuilt".into(), json!("not a year"));

        let record = transformer.transform_record(&input, None).unwrap();
        assert_eq!(record.get("year_built"), Some(&FieldValue::Null));
    }

    #[test]
    fn required_coercion_failure_fails_the_record() {
        let mut transformer = RecordTransformer::new();
        let mut input = property("L1");
        input.insert("ModificationTimestamp".into(), json!("garbage"));

        let err = transformer.transform_record(&input, None).unwrap_err();
        assert!(matches!(err, ListflowError::Validation(_)));
    }

    #[test]
    fn missing_required_field_fails_the_record() {
        let mut transformer = RecordTransformer::new();
        let mut input = property("L1");
        input.remove("ListingKey");

        let err = transformer.transform_record(&input, None).unwrap_err();
        assert!(err.to_string().contains("listing_key"));
    }

    #[test]
    fn negative_price_is_an_error_but_high_price_only_warns() {
        let mut transformer = RecordTransformer::new();

        let mut negative = property("L1");
        negative.insert("ListPrice".into(), json!(-1));
        assert!(transformer.transform_record(&negative, None).is_err());

        let mut high = property("L2");
        high.insert("ListPrice".into(), json!(2_000_000_000i64));
        assert!(transformer.transform_record(&high, None).is_ok());
    }

    #[test]
    fn year_built_bounds() {
        let mut transformer = RecordTransformer::new();

        let mut early = property("L1");
        early.insert("YearBuilt".into(), json!(1750));
        assert!(transformer.transform_record(&early, None).is_err());

        let far_future = i64::from(Utc::now().year()) + 6;
        let mut future = property("L2");
        future.insert("YearBuilt".into(), json!(far_future));
        assert!(transformer.transform_record(&future, None).is_err());

        let mut next_year = property("L3");
        next_year.insert("YearBuilt".into(), json!(i64::from(Utc::now().year()) + 1));
        assert!(transformer.transform_record(&next_year, None).is_ok());
    }

    #[test]
    fn bedroom_bounds() {
        let mut transformer = RecordTransformer::new();

        let mut negative = property("L1");
        negative.insert("BedroomsTotal".into(), json!(-2));
        assert!(transformer.transform_record(&negative, None).is_err());

        let mut many = property("L2");
        many.insert("BedroomsTotal".into(), json!(60));
        assert!(transformer.transform_record(&many, None).is_ok());
    }

    #[test]
    fn duplicate_detection_sequence() {
        let mut transformer = RecordTransformer::new();
        let keys = ["A", "B", "A", "A"];
        let flags: Vec<bool> = keys
            .iter()
            .map(|k| transformer.transform_record(&property(k), None).unwrap().is_duplicate)
            .collect();
        assert_eq!(flags, vec![false, false, true, true]);
    }

    #[test]
    fn external_keys_mark_duplicates() {
        let mut transformer = RecordTransformer::new();
        let existing: HashSet<String> = ["A".to_string()].into_iter().collect();

        let record = transformer.transform_record(&property("A"), Some(&existing)).unwrap();
        assert!(record.is_duplicate);
        let record = transformer.transform_record(&property("B"), Some(&existing)).unwrap();
        assert!(!record.is_duplicate);
    }

    #[test]
    fn duplicate_cache_clears_between_batches() {
        let mut transformer = RecordTransformer::new();
        let batch = vec![property("A")];

        let first = transformer.transform_batch(&batch, None, true).unwrap();
        assert_eq!(first.stats.duplicates_detected, 0);

        // Same key again in a fresh batch: not a duplicate.
        let second = transformer.transform_batch(&batch, None, true).unwrap();
        assert_eq!(second.stats.duplicates_detected, 0);
    }

    #[test]
    fn batch_stats_invariant_holds_for_mixed_input() {
        let mut transformer = RecordTransformer::new();

        let mut bad_key = property("ignored");
        bad_key.insert("ListingKey".into(), json!(null));
        let mut bad_ts = property("L9");
        bad_ts.insert("ModificationTimestamp".into(), json!("not-a-timestamp"));

        let batch = vec![
            property("L1"),
            property("L2"),
            property("L3"),
            property("L4"),
            property("L5"),
            bad_key,
            bad_ts,
        ];

        let result = transformer.transform_batch(&batch, None, true).unwrap();
        assert_eq!(result.stats.total_records, 7);
        assert_eq!(result.stats.valid_records, 5);
        assert_eq!(result.stats.invalid_records, 2);
        assert_eq!(
            result.stats.valid_records + result.stats.invalid_records,
            result.stats.total_records
        );
        assert_eq!(result.records.len(), result.stats.valid_records);
        assert_eq!(result.stats.validation_errors.len(), 2);
        assert!(result.stats.validation_errors[0].starts_with("Record 5:"));
    }

    #[test]
    fn batch_aborts_on_first_failure_when_not_continuing() {
        let mut transformer = RecordTransformer::new();
        let mut bad = property("L1");
        bad.remove("ListingKey");

        let batch = vec![bad, property("L2")];
        let err = transformer.transform_batch(&batch, None, false).unwrap_err();
        assert!(err.to_string().contains("Record 0"));
    }

    #[test]
    fn empty_batch_yields_zeroed_stats() {
        let mut transformer = RecordTransformer::new();
        let result = transformer.transform_batch(&[], None, true).unwrap();
        assert_eq!(result.stats.total_records, 0);
        assert_eq!(result.stats.valid_records, 0);
        assert_eq!(result.stats.invalid_records, 0);
        assert!(result.records.is_empty());
    }

    #[test]
    fn field_transformation_counts_track_output_fields() {
        let mut transformer = RecordTransformer::new();
        let batch = vec![property("L1"), property("L2")];

        let result = transformer.transform_batch(&batch, None, true).unwrap();
        assert_eq!(result.stats.field_transformations.get("listing_key"), Some(&2));
        assert_eq!(result.stats.field_transformations.get("city"), Some(&2));
    }

    #[test]
    fn duplicates_count_only_successful_records() {
        let mut transformer = RecordTransformer::new();
        let batch = vec![property("A"), property("A"), property("A")];

        let result = transformer.transform_batch(&batch, None, true).unwrap();
        assert_eq!(result.stats.valid_records, 3);
        assert_eq!(result.stats.duplicates_detected, 2);
    }
}
