//! Configuration structures
//!
//! Loads API and sync configuration from environment variables.
//!
//! ## Environment Variables
//! - `LISTFLOW_CLIENT_ID`: OAuth2 client id
//! - `LISTFLOW_CLIENT_SECRET`: OAuth2 client secret
//! - `LISTFLOW_TOKEN_URL`: OAuth2 token endpoint
//! - `LISTFLOW_API_BASE_URL`: OData service root (trailing slash optional)
//! - `LISTFLOW_API_TIMEOUT_SECS`: Per-request timeout (default: 30)
//! - `LISTFLOW_API_MAX_RETRIES`: Rate-limit retry budget (default: 3)
//! - `LISTFLOW_API_BASE_DELAY_MS`: Base backoff delay (default: 1000)
//! - `LISTFLOW_SYNC_PAGE_SIZE`: Records per page (default: 1000)
//! - `LISTFLOW_SYNC_INCREMENTAL_FIELD`: Watermark field (default: ModificationTimestamp)
//! - `LISTFLOW_SYNC_MAX_AGE_HOURS`: Incremental freshness bound (default: 24)

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{ListflowError, Result};

/// Upstream API credentials and endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    /// OData service root, e.g. `https://api.example.com/odata/`.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Retry budget for 429 responses. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
}

impl ApiConfig {
    /// Load API configuration from environment variables.
    ///
    /// Reads a `.env` file when present, then the process environment.
    ///
    /// # Errors
    /// Returns `ListflowError::Config` if a required variable is missing
    /// or a numeric variable fails to parse.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            client_id: env_var("LISTFLOW_CLIENT_ID")?,
            client_secret: env_var("LISTFLOW_CLIENT_SECRET")?,
            token_url: env_var("LISTFLOW_TOKEN_URL")?,
            base_url: env_var("LISTFLOW_API_BASE_URL")?,
            timeout_secs: env_parse("LISTFLOW_API_TIMEOUT_SECS", 30)?,
            max_retries: env_parse("LISTFLOW_API_MAX_RETRIES", 3)?,
            base_delay_ms: env_parse("LISTFLOW_API_BASE_DELAY_MS", 1000)?,
        })
    }

    /// Per-request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Base backoff delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Sync coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Records requested per page. Clamped to the protocol maximum of
    /// 1000 by the client.
    pub page_size: u32,
    /// Field used for incremental watermark filters.
    pub incremental_field: String,
    /// A stored watermark older than this is treated as stale and a full
    /// sync is performed instead.
    pub max_age_hours: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            incremental_field: "ModificationTimestamp".to_string(),
            max_age_hours: 24,
        }
    }
}

impl SyncConfig {
    /// Load sync configuration from environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            page_size: env_parse("LISTFLOW_SYNC_PAGE_SIZE", defaults.page_size)?,
            incremental_field: std::env::var("LISTFLOW_SYNC_INCREMENTAL_FIELD")
                .unwrap_or(defaults.incremental_field),
            max_age_hours: env_parse("LISTFLOW_SYNC_MAX_AGE_HOURS", defaults.max_age_hours)?,
        })
    }
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| ListflowError::Config(format!("Missing environment variable: {name}")))
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| ListflowError::Config(format!("Invalid value for {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
