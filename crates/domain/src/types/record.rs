//! Record types flowing through the transformation pipeline

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One record as returned by the upstream API: external field names
/// mapped to untyped JSON values. Consumed immediately by the
/// transformer, then discarded.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A typed column value produced by the coercion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Decimal(Decimal),
    /// Wall-clock timestamp without zone; values carrying a `Z` suffix
    /// are interpreted as UTC before the zone is dropped.
    Timestamp(NaiveDateTime),
    Flag(bool),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view used by business-rule checks: integers and decimals
    /// both surface as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Decimal(v) => {
                use rust_decimal::prelude::ToPrimitive;
                v.to_f64()
            }
            _ => None,
        }
    }
}

/// A record after field normalization, coercion, and validation: safe
/// internal field names mapped to typed values, plus a duplicate marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub fields: BTreeMap<String, FieldValue>,
    /// Set by duplicate detection; informational for the upsert step.
    pub is_duplicate: bool,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self { fields: BTreeMap::new(), is_duplicate: false }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The record's unique key, when present and textual.
    pub fn listing_key(&self) -> Option<&str> {
        self.fields.get("listing_key").and_then(FieldValue::as_text)
    }
}

impl Default for NormalizedRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_key_requires_text() {
        let mut record = NormalizedRecord::new();
        record.fields.insert("listing_key".into(), FieldValue::Integer(42));
        assert_eq!(record.listing_key(), None);

        record.fields.insert("listing_key".into(), FieldValue::Text("L42".into()));
        assert_eq!(record.listing_key(), Some("L42"));
    }

    #[test]
    fn numeric_view_covers_integer_and_decimal() {
        assert_eq!(FieldValue::Integer(7).as_f64(), Some(7.0));
        let dec = FieldValue::Decimal(Decimal::new(125, 1));
        assert_eq!(dec.as_f64(), Some(12.5));
        assert_eq!(FieldValue::Text("7".into()).as_f64(), None);
    }
}
