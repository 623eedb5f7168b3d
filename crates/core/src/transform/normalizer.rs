//! Field name normalization
//!
//! Maps arbitrary external field names onto safe internal column
//! identifiers: lowercase, `[a-z0-9_]` only, reserved-word free, at most
//! 64 characters. Results are memoized per normalizer instance.

use std::collections::{HashMap, HashSet};

use listflow_domain::{ListflowError, Result};
use once_cell::sync::Lazy;

/// SQL keywords that must not be used as column names.
static RESERVED_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "add", "all", "alter", "analyze", "and", "as", "asc", "asensitive", "before", "between",
        "bigint", "binary", "blob", "both", "by", "call", "cascade", "case", "change", "char",
        "character", "check", "collate", "column", "condition", "constraint", "continue",
        "convert", "create", "cross", "current_date", "current_time", "current_timestamp",
        "current_user", "cursor", "database", "databases", "day_hour", "day_microsecond",
        "day_minute", "day_second", "dec", "decimal", "declare", "default", "delayed", "delete",
        "desc", "describe", "deterministic", "distinct", "distinctrow", "div", "double", "drop",
        "dual", "each", "else", "elseif", "enclosed", "escaped", "exists", "exit", "explain",
        "false", "fetch", "float", "float4", "float8", "for", "force", "foreign", "from",
        "fulltext", "grant", "group", "having", "high_priority", "hour_microsecond",
        "hour_minute", "hour_second", "if", "ignore", "in", "index", "infile", "inner", "inout",
        "insensitive", "insert", "int", "int1", "int2", "int3", "int4", "int8", "integer",
        "interval", "into", "is", "iterate", "join", "key", "keys", "kill", "leading", "leave",
        "left", "like", "limit", "linear", "lines", "load", "localtime", "localtimestamp",
        "lock", "long", "longblob", "longtext", "loop", "low_priority", "match", "mediumblob",
        "mediumint", "mediumtext", "middleint", "minute_microsecond", "minute_second", "mod",
        "modifies", "natural", "not", "no_write_to_binlog", "null", "numeric", "on", "optimize",
        "option", "optionally", "or", "order", "out", "outer", "outfile", "precision",
        "primary", "procedure", "purge", "range", "read", "reads", "real", "references",
        "regexp", "release", "rename", "repeat", "replace", "require", "restrict", "return",
        "revoke", "right", "rlike", "schema", "schemas", "second_microsecond", "select",
        "sensitive", "separator", "set", "show", "smallint", "spatial", "specific", "sql",
        "sqlexception", "sqlstate", "sqlwarning", "sql_big_result", "sql_calc_found_rows",
        "sql_small_result", "ssl", "starting", "straight_join", "table", "terminated", "then",
        "tinyblob", "tinyint", "tinytext", "to", "trailing", "trigger", "true", "undo", "union",
        "unique", "unlock", "unsigned", "update", "usage", "use", "using", "utc_date",
        "utc_time", "utc_timestamp", "values", "varbinary", "varchar", "varcharacter",
        "varying", "when", "where", "while", "with", "write", "x509", "xor", "year_month",
        "zerofill",
    ]
    .into_iter()
    .collect()
});

const MAX_IDENTIFIER_LEN: usize = 64;
const RESERVED_SUFFIX: &str = "_field";

/// Memoizing field-name normalizer.
///
/// Repeated calls with the same input return the identical cached
/// output; failed calls are not cached. Normalization is idempotent:
/// already-normalized identifiers are fixed points.
#[derive(Debug, Default)]
pub struct FieldNormalizer {
    cache: HashMap<String, String>,
}

impl FieldNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize an external field name to a safe internal identifier.
    ///
    /// # Errors
    /// Returns `ListflowError::Transform` for empty or whitespace-only
    /// input.
    pub fn normalize(&mut self, field_name: &str) -> Result<String> {
        if field_name.trim().is_empty() {
            return Err(ListflowError::Transform(format!(
                "Empty or whitespace-only field name: '{field_name}'"
            )));
        }

        if let Some(cached) = self.cache.get(field_name) {
            return Ok(cached.clone());
        }

        let normalized = normalize_uncached(field_name);
        self.cache.insert(field_name.to_string(), normalized.clone());
        Ok(normalized)
    }

    /// The memoized mapping of external names to internal identifiers.
    pub fn mapping(&self) -> &HashMap<String, String> {
        &self.cache
    }
}

fn normalize_uncached(field_name: &str) -> String {
    // Lowercase, then squash everything outside [a-z0-9_] to '_'.
    let mut cleaned = String::with_capacity(field_name.len());
    for ch in field_name.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_' {
            cleaned.push(ch);
        } else {
            cleaned.push('_');
        }
    }

    // Collapse runs of underscores, trim them from both ends.
    let mut collapsed = String::with_capacity(cleaned.len());
    let mut prev_underscore = false;
    for ch in cleaned.chars() {
        if ch == '_' {
            if !prev_underscore {
                collapsed.push('_');
            }
            prev_underscore = true;
        } else {
            collapsed.push(ch);
            prev_underscore = false;
        }
    }
    let mut normalized = collapsed.trim_matches('_').to_string();

    // Identifiers must start with a letter or underscore.
    if let Some(first) = normalized.chars().next() {
        if !(first.is_ascii_lowercase() || first == '_') {
            normalized = format!("field_{normalized}");
        }
    }

    if normalized.is_empty() {
        normalized = "field_unknown".to_string();
    }

    if RESERVED_WORDS.contains(normalized.as_str()) {
        normalized.push_str(RESERVED_SUFFIX);
    }

    if normalized.len() > MAX_IDENTIFIER_LEN {
        if normalized.ends_with(RESERVED_SUFFIX) {
            // Keep the suffix intact when truncating.
            let stem_len = MAX_IDENTIFIER_LEN - RESERVED_SUFFIX.len();
            normalized = format!("{}{RESERVED_SUFFIX}", &normalized[..stem_len]);
        } else {
            normalized.truncate(MAX_IDENTIFIER_LEN);
        }
    }

    normalized
}
