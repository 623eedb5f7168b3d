//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Listflow
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ListflowError {
    /// Credential or token problems. Never retried automatically.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Protocol, transport, or non-retryable HTTP failure from the feed.
    #[error("OData error: {0}")]
    OData(String),

    /// 429 responses exhausted the configured retry budget.
    ///
    /// Carried as a structured variant so retry eligibility is a tag
    /// check rather than message matching.
    #[error("Rate limit exceeded after {retries} retries")]
    RateLimited { retries: u32 },

    /// Value-level normalization or coercion failure.
    #[error("Data transformation error: {0}")]
    Transform(String),

    /// Record-level required-field or business-rule failure.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by the persistence collaborator.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Listflow operations
pub type Result<T> = std::result::Result<T, ListflowError>;
