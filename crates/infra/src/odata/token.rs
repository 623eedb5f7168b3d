//! Bearer token cache with expiry handling

use chrono::{DateTime, Duration, Utc};

/// Tokens within this buffer of expiry are treated as expired, so a
/// request never goes out with a token about to lapse mid-flight.
const EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Caches one bearer token and its absolute expiry.
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached token, if it is still comfortably inside its validity
    /// window.
    pub fn token(&self, now: DateTime<Utc>) -> Option<String> {
        let token = self.token.as_ref()?;
        let expires_at = self.expires_at?;
        if now < expires_at - Duration::minutes(EXPIRY_BUFFER_MINUTES) {
            Some(token.clone())
        } else {
            None
        }
    }

    /// Cache a token with its lifetime in seconds.
    pub fn store(&mut self, token: &str, expires_in_secs: i64, now: DateTime<Utc>) {
        self.token = Some(token.to_string());
        self.expires_at = Some(now + Duration::seconds(expires_in_secs));
    }

    /// Drop the cached token, forcing re-authentication on next use.
    pub fn clear(&mut self) {
        self.token = None;
        self.expires_at = None;
    }
}
