//! Type coercion engine
//!
//! Converts untyped JSON values from the feed into typed column values.
//! Null input always coerces to null, for every target kind.

use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use listflow_domain::{FieldValue, ListflowError, Result};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::warn;

/// Semantic target kinds the coercion engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    Text,
    Integer,
    Decimal,
    Timestamp,
    Flag,
}

impl TargetKind {
    /// Parse an external kind name.
    ///
    /// # Errors
    /// Returns `ListflowError::Transform` naming the offending kind.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(Self::Text),
            "integer" => Ok(Self::Integer),
            "decimal" => Ok(Self::Decimal),
            "datetime" => Ok(Self::Timestamp),
            "boolean" => Ok(Self::Flag),
            other => Err(ListflowError::Transform(format!("Unknown target type: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Timestamp => "datetime",
            Self::Flag => "boolean",
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Datetime formats accepted by the feed, tried in order.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Convert an untyped value into the given target kind.
///
/// `field` is used for error and warning messages only.
///
/// # Errors
/// Returns `ListflowError::Transform` when the value cannot be
/// represented in the target kind.
pub fn coerce(value: &Value, target: TargetKind, field: &str) -> Result<FieldValue> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    match target {
        TargetKind::Text => coerce_text(value),
        TargetKind::Integer => coerce_integer(value, field),
        TargetKind::Decimal => coerce_decimal(value, field),
        TargetKind::Timestamp => coerce_timestamp(value, field),
        TargetKind::Flag => coerce_flag(value, field),
    }
}

fn coerce_text(value: &Value) -> Result<FieldValue> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(FieldValue::Null)
            } else {
                Ok(FieldValue::Text(trimmed.to_string()))
            }
        }
        Value::Bool(b) => Ok(FieldValue::Text(b.to_string())),
        Value::Number(n) => Ok(FieldValue::Text(n.to_string())),
        // Structured values are kept as their JSON rendering.
        other => Ok(FieldValue::Text(other.to_string())),
    }
}

fn coerce_integer(value: &Value, field: &str) -> Result<FieldValue> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(FieldValue::Integer(i));
            }
            let float = n.as_f64().ok_or_else(|| {
                ListflowError::Transform(format!(
                    "Failed to convert {field} value '{n}' to integer: out of range"
                ))
            })?;
            Ok(FieldValue::Integer(truncate_to_integer(float, field)))
        }
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            if cleaned.is_empty() {
                return Ok(FieldValue::Null);
            }
            // Parse as float first so "123.0" survives.
            let float = cleaned.parse::<f64>().map_err(|e| {
                ListflowError::Transform(format!(
                    "Failed to convert {field} value '{s}' to integer: {e}"
                ))
            })?;
            Ok(FieldValue::Integer(truncate_to_integer(float, field)))
        }
        Value::Bool(b) => Ok(FieldValue::Integer(i64::from(*b))),
        other => Err(ListflowError::Transform(format!(
            "Failed to convert {field} value '{other}' to integer: unsupported type"
        ))),
    }
}

fn truncate_to_integer(value: f64, field: &str) -> i64 {
    let truncated = value.trunc();
    if (value - truncated).abs() > 0.001 {
        warn!(field, value, truncated, "precision loss converting to integer");
    }
    truncated as i64
}

fn coerce_decimal(value: &Value, field: &str) -> Result<FieldValue> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map(FieldValue::Decimal)
            .map_err(|e| {
                ListflowError::Transform(format!(
                    "Failed to convert {field} value '{n}' to decimal: {e}"
                ))
            }),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            let cleaned = cleaned.trim_start_matches('$').trim();
            if cleaned.is_empty() {
                return Ok(FieldValue::Null);
            }
            Decimal::from_str(cleaned).map(FieldValue::Decimal).map_err(|e| {
                ListflowError::Transform(format!(
                    "Failed to convert {field} value '{s}' to decimal: {e}"
                ))
            })
        }
        other => Err(ListflowError::Transform(format!(
            "Failed to convert {field} value '{other}' to decimal: unsupported type"
        ))),
    }
}

fn coerce_timestamp(value: &Value, field: &str) -> Result<FieldValue> {
    let Value::String(s) = value else {
        return Err(ListflowError::Transform(format!(
            "Cannot convert {field} value '{value}' to datetime"
        )));
    };

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(FieldValue::Timestamp(parsed));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(s, format) {
            if let Some(midnight) = parsed.and_hms_opt(0, 0, 0) {
                return Ok(FieldValue::Timestamp(midnight));
            }
        }
    }

    Err(ListflowError::Transform(format!("Unable to parse datetime: {s}")))
}

fn coerce_flag(value: &Value, field: &str) -> Result<FieldValue> {
    match value {
        Value::Bool(b) => Ok(FieldValue::Flag(*b)),
        Value::Number(n) => {
            let truthy = n.as_f64().map(|f| f != 0.0).unwrap_or(true);
            Ok(FieldValue::Flag(truthy))
        }
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "y" | "on" => Ok(FieldValue::Flag(true)),
            "false" | "0" | "no" | "n" | "off" => Ok(FieldValue::Flag(false)),
            _ => Err(ListflowError::Transform(format!(
                "Cannot convert {field} string to boolean: {s}"
            ))),
        },
        other => Err(ListflowError::Transform(format!(
            "Cannot convert {field} value '{other}' to boolean"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn null_coerces_to_null_for_every_kind() {
        for kind in [
            TargetKind::Text,
            TargetKind::Integer,
            TargetKind::Decimal,
            TargetKind::Timestamp,
            TargetKind::Flag,
        ] {
            assert_eq!(coerce(&Value::Null, kind, "f").unwrap(), FieldValue::Null);
        }
    }

    #[test]
    fn unknown_target_kind_names_the_offender() {
        let err = TargetKind::parse("varchar2").unwrap_err();
        assert!(err.to_string().contains("varchar2"));
    }

    #[test]
    fn text_trims_and_nullifies_empty() {
        assert_eq!(
            coerce(&json!("  hello  "), TargetKind::Text, "f").unwrap(),
            FieldValue::Text("hello".into())
        );
        assert_eq!(coerce(&json!("   "), TargetKind::Text, "f").unwrap(), FieldValue::Null);
        assert_eq!(
            coerce(&json!(42), TargetKind::Text, "f").unwrap(),
            FieldValue::Text("42".into())
        );
        assert_eq!(
            coerce(&json!(true), TargetKind::Text, "f").unwrap(),
            FieldValue::Text("true".into())
        );
    }

    #[test]
    fn integers_pass_through_unchanged() {
        for i in [-5i64, 0, 1, 42, 1_000_000] {
            assert_eq!(
                coerce(&json!(i), TargetKind::Integer, "f").unwrap(),
                FieldValue::Integer(i)
            );
        }
    }

    #[test]
    fn integer_truncates_floats_and_tolerates_trailing_zero() {
        assert_eq!(
            coerce(&json!(3.7), TargetKind::Integer, "f").unwrap(),
            FieldValue::Integer(3)
        );
        assert_eq!(
            coerce(&json!(-3.7), TargetKind::Integer, "f").unwrap(),
            FieldValue::Integer(-3)
        );
        assert_eq!(
            coerce(&json!("123.0"), TargetKind::Integer, "f").unwrap(),
            FieldValue::Integer(123)
        );
    }

    #[test]
    fn integer_strips_thousands_separators() {
        assert_eq!(
            coerce(&json!("1,234,567"), TargetKind::Integer, "f").unwrap(),
            FieldValue::Integer(1_234_567)
        );
        assert_eq!(coerce(&json!("  "), TargetKind::Integer, "f").unwrap(), FieldValue::Null);
        assert!(coerce(&json!("12x"), TargetKind::Integer, "f").is_err());
    }

    #[test]
    fn decimal_strips_separators_and_currency() {
        assert_eq!(
            coerce(&json!("$1,250,000.50"), TargetKind::Decimal, "price").unwrap(),
            FieldValue::Decimal(Decimal::from_str("1250000.50").unwrap())
        );
        assert_eq!(
            coerce(&json!(12.5), TargetKind::Decimal, "f").unwrap(),
            FieldValue::Decimal(Decimal::from_str("12.5").unwrap())
        );
        assert_eq!(coerce(&json!(""), TargetKind::Decimal, "f").unwrap(), FieldValue::Null);
        assert!(coerce(&json!("abc"), TargetKind::Decimal, "f").is_err());
    }

    #[test]
    fn datetime_accepts_each_documented_format() {
        let cases = [
            "2024-01-15T10:30:00.123456Z",
            "2024-01-15T10:30:00Z",
            "2024-01-15T10:30:00",
            "2024-01-15 10:30:00",
            "2024-01-15",
            "01/15/2024",
            "01/15/2024 10:30:00",
        ];
        for case in cases {
            let parsed = coerce(&json!(case), TargetKind::Timestamp, "ts");
            assert!(parsed.is_ok(), "failed to parse {case:?}: {parsed:?}");
        }
    }

    #[test]
    fn datetime_first_match_wins() {
        let parsed = coerce(&json!("2024-01-15T10:30:00Z"), TargetKind::Timestamp, "ts").unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn date_only_lands_on_midnight() {
        let parsed = coerce(&json!("2024-03-01"), TargetKind::Timestamp, "ts").unwrap();
        let expected =
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
        assert_eq!(parsed, FieldValue::Timestamp(expected));
    }

    #[test]
    fn datetime_rejects_garbage_and_non_strings() {
        assert!(coerce(&json!("not a date"), TargetKind::Timestamp, "ts").is_err());
        assert!(coerce(&json!(1705315800), TargetKind::Timestamp, "ts").is_err());
    }

    #[test]
    fn boolean_tokens_are_case_insensitive() {
        for token in ["true", "1", "yes", "Y", "ON", " True "] {
            assert_eq!(
                coerce(&json!(token), TargetKind::Flag, "f").unwrap(),
                FieldValue::Flag(true),
                "token {token:?}"
            );
        }
        for token in ["false", "0", "no", "N", "OFF", " False "] {
            assert_eq!(
                coerce(&json!(token), TargetKind::Flag, "f").unwrap(),
                FieldValue::Flag(false),
                "token {token:?}"
            );
        }
        assert!(coerce(&json!("maybe"), TargetKind::Flag, "f").is_err());
    }

    #[test]
    fn boolean_numeric_truthiness() {
        assert_eq!(coerce(&json!(0), TargetKind::Flag, "f").unwrap(), FieldValue::Flag(false));
        assert_eq!(coerce(&json!(2), TargetKind::Flag, "f").unwrap(), FieldValue::Flag(true));
        assert_eq!(coerce(&json!(true), TargetKind::Flag, "f").unwrap(), FieldValue::Flag(true));
        assert!(coerce(&json!([1]), TargetKind::Flag, "f").is_err());
    }
}
