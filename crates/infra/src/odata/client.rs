//! OData client for the listing feed
//!
//! Handles OAuth2 client-credentials authentication with token caching,
//! OData query construction, cursor-based pagination, response
//! classification, quota-header tracking, and exponential-backoff retry
//! for rate-limited requests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use listflow_core::{FeedQuery, ListingFeed};
use listflow_domain::{
    ApiConfig, ListflowError, QuotaReading, QuotaSnapshot, QuotaWindowKind, RawRecord,
    ResourceKind, Result,
};
use reqwest::{header, Response, StatusCode};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::token::TokenCache;

/// Protocol ceiling on `$top`; larger requests are clamped.
const MAX_PAGE_SIZE: u32 = 1000;
/// Token lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 28_800;

/// Optional query parameters for one OData request.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub filter: Option<String>,
    pub select: Option<Vec<String>>,
    pub top: Option<u32>,
    pub skip: Option<u32>,
    pub orderby: Option<String>,
}

/// One parsed OData response: the body fields plus the response headers
/// and status code, so callers can inspect quota counters without
/// re-parsing.
#[derive(Debug, Clone)]
pub struct ODataResponse {
    pub body: serde_json::Map<String, Value>,
    pub headers: HashMap<String, String>,
    pub status: u16,
}

impl ODataResponse {
    /// The page's `value` array as records. A missing array is an empty
    /// page, not an error.
    pub fn records(&self) -> Vec<RawRecord> {
        self.body
            .get("value")
            .and_then(Value::as_array)
            .map(|items| {
                items.iter().filter_map(Value::as_object).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Opaque continuation URL for the next page, when one exists.
    pub fn next_link(&self) -> Option<&str> {
        self.body.get("@odata.nextLink").and_then(Value::as_str)
    }
}

/// Raw `$metadata` document.
#[derive(Debug, Clone)]
pub struct MetadataDocument {
    pub content: String,
    pub content_type: Option<String>,
}

/// OData client with OAuth2 client-credentials authentication.
pub struct ODataClient {
    config: ApiConfig,
    http: reqwest::Client,
    token_cache: RwLock<TokenCache>,
    quota: Mutex<QuotaSnapshot>,
}

impl ODataClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns `ListflowError::Internal` if the HTTP client cannot be
    /// constructed, or `ListflowError::Config` for an unparseable base
    /// URL.
    pub fn new(mut config: ApiConfig) -> Result<Self> {
        if !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }
        url::Url::parse(&config.base_url)
            .map_err(|e| ListflowError::Config(format!("Invalid base URL: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ListflowError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            token_cache: RwLock::new(TokenCache::new()),
            quota: Mutex::new(QuotaSnapshot::default()),
        })
    }

    /// Authenticate with the OAuth2 client-credentials grant.
    ///
    /// Returns the cached token when it is still valid; otherwise posts
    /// to the token endpoint and caches the result. Authentication
    /// failures are not retried.
    ///
    /// # Errors
    /// `ListflowError::Auth` for credential, transport, or token-shape
    /// problems.
    pub async fn authenticate(&self) -> Result<String> {
        if let Some(token) = self.token_cache.read().await.token(Utc::now()) {
            return Ok(token);
        }

        let response = self
            .http
            .post(&self.config.token_url)
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("grant_type", "client_credentials"),
                ("scope", "api"),
            ])
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                ListflowError::Auth(format!("Network error during authentication: {e}"))
            })?;

        let status = response.status();
        match status.as_u16() {
            200 => {
                let body: Value = response.json().await.map_err(|e| {
                    ListflowError::Auth(format!(
                        "Invalid JSON response during authentication: {e}"
                    ))
                })?;

                let token = body
                    .get("access_token")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        ListflowError::Auth("No access token in response".to_string())
                    })?;
                let expires_in = body
                    .get("expires_in")
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_TOKEN_TTL_SECS);

                self.token_cache.write().await.store(token, expires_in, Utc::now());
                debug!(expires_in, "authenticated against token endpoint");
                Ok(token.to_string())
            }
            401 => Err(ListflowError::Auth("Invalid client credentials".to_string())),
            400 => {
                let body: Value = response.json().await.unwrap_or(Value::Null);
                let description = body
                    .get("error_description")
                    .and_then(Value::as_str)
                    .unwrap_or("Bad request");
                Err(ListflowError::Auth(format!("Authentication failed: {description}")))
            }
            code => {
                let text = response.text().await.unwrap_or_default();
                Err(ListflowError::Auth(format!(
                    "Authentication failed with status {code}: {text}"
                )))
            }
        }
    }

    /// Drop the cached token, forcing re-authentication on next use.
    pub async fn reset_token(&self) {
        self.token_cache.write().await.clear();
    }

    /// Build an OData query URL. Absent options do not appear in the
    /// query string.
    ///
    /// # Errors
    /// `ListflowError::Config` when the entity set does not form a
    /// valid URL against the configured base.
    pub fn build_query_url(&self, entity_set: &str, options: &QueryOptions) -> Result<String> {
        let base = url::Url::parse(&self.config.base_url)
            .and_then(|base| base.join(entity_set))
            .map_err(|e| {
                ListflowError::Config(format!("Invalid query URL for {entity_set}: {e}"))
            })?;

        let mut url = base;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(filter) = options.filter.as_deref().filter(|f| !f.is_empty()) {
                pairs.append_pair("$filter", filter);
            }
            if let Some(select) = options.select.as_deref().filter(|s| !s.is_empty()) {
                pairs.append_pair("$select", &select.join(","));
            }
            if let Some(top) = options.top {
                pairs.append_pair("$top", &top.to_string());
            }
            if let Some(skip) = options.skip {
                pairs.append_pair("$skip", &skip.to_string());
            }
            if let Some(orderby) = options.orderby.as_deref().filter(|o| !o.is_empty()) {
                pairs.append_pair("$orderby", orderby);
            }
        }

        let mut rendered = url.to_string();
        // An empty pair set leaves a dangling '?'.
        if rendered.ends_with('?') {
            rendered.pop();
        }
        Ok(rendered)
    }

    /// Execute one OData query.
    pub async fn execute_query(
        &self,
        entity_set: &str,
        options: &QueryOptions,
    ) -> Result<ODataResponse> {
        let url = self.build_query_url(entity_set, options)?;
        self.execute_request(&url).await
    }

    /// Execute a request against an absolute URL (pagination links).
    pub async fn execute_url(&self, url: &str) -> Result<ODataResponse> {
        self.execute_request(url).await
    }

    /// Fetch every page for a query, following the server's next-page
    /// link until it stops offering one or `max_pages` is reached.
    /// Records are concatenated in server-delivered order.
    pub async fn execute_paginated_query(
        &self,
        entity_set: &str,
        options: &QueryOptions,
        max_pages: Option<usize>,
    ) -> Result<Vec<RawRecord>> {
        let mut options = options.clone();
        options.top = options.top.map(|top| top.min(MAX_PAGE_SIZE));

        let mut records = Vec::new();
        let mut response = self.execute_query(entity_set, &options).await?;
        let mut pages_fetched = 1usize;

        loop {
            records.extend(response.records());

            if max_pages.is_some_and(|cap| pages_fetched >= cap) {
                debug!(entity_set, pages_fetched, "pagination stopped at page cap");
                break;
            }
            let Some(next) = response.next_link().map(String::from) else {
                break;
            };

            response = self.execute_url(&next).await?;
            pages_fetched += 1;
        }

        debug!(entity_set, pages_fetched, total = records.len(), "paginated query completed");
        Ok(records)
    }

    /// Fetch the service `$metadata` document.
    pub async fn fetch_metadata(&self) -> Result<MetadataDocument> {
        let url = format!("{}$metadata", self.config.base_url);
        let token = self.authenticate().await?;

        let response = self.metadata_request(&url, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.reset_token().await;
            let token = self.authenticate().await?;
            let retried = self.metadata_request(&url, &token).await?;
            if !retried.status().is_success() {
                return Err(ListflowError::OData(format!(
                    "Authentication failed after retry: {}",
                    retried.status().as_u16()
                )));
            }
            return Self::read_metadata(retried).await;
        }
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(ListflowError::OData(format!(
                "Metadata request failed: {status} - {text}"
            )));
        }

        Self::read_metadata(response).await
    }

    async fn metadata_request(&self, url: &str, token: &str) -> Result<Response> {
        self.http
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/xml")
            .send()
            .await
            .map_err(|e| {
                ListflowError::OData(format!("Network error during metadata request: {e}"))
            })
    }

    async fn read_metadata(response: Response) -> Result<MetadataDocument> {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let content = response.text().await.map_err(|e| {
            ListflowError::OData(format!("Failed to read metadata response: {e}"))
        })?;
        Ok(MetadataDocument { content, content_type })
    }

    /// The quota state parsed from the most recent response headers.
    pub fn quota_snapshot(&self) -> QuotaSnapshot {
        self.quota.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Per-window low-quota flags: `remaining / limit <= threshold`.
    /// Windows without a known limit are omitted.
    pub fn is_quota_approaching_limit(&self, threshold: f64) -> HashMap<QuotaWindowKind, bool> {
        self.quota_snapshot().approaching_limit(threshold)
    }

    /// Execute a GET with authentication, classifying the outcome and
    /// retrying only rate-limited responses.
    async fn execute_request(&self, url: &str) -> Result<ODataResponse> {
        let mut attempt: u32 = 0;

        loop {
            match self.send_once(url).await {
                Err(ListflowError::RateLimited { .. }) if attempt < self.config.max_retries => {
                    let delay = backoff_delay(self.config.base_delay(), attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "rate limited; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(ListflowError::RateLimited { .. }) => {
                    return Err(ListflowError::RateLimited {
                        retries: self.config.max_retries,
                    });
                }
                other => return other,
            }
        }
    }

    /// One request attempt, including the single automatic
    /// re-authentication on 401.
    async fn send_once(&self, url: &str) -> Result<ODataResponse> {
        let token = self.authenticate().await?;
        let response = self.data_request(url, &token).await?;

        let status = response.status();
        debug!(%url, status = status.as_u16(), "received OData response");

        if status == StatusCode::UNAUTHORIZED {
            // Token revoked or expired upstream. Re-authenticate once
            // and retry the same request.
            self.reset_token().await;
            let token = self.authenticate().await?;
            let retried = self.data_request(url, &token).await?;
            if retried.status().is_success() {
                return self.parse_success(retried, " after retry").await;
            }
            return Err(ListflowError::OData(format!(
                "Authentication failed after retry: {}",
                retried.status().as_u16()
            )));
        }

        if status.is_success() {
            return self.parse_success(response, "").await;
        }

        let code = status.as_u16();
        let text = response.text().await.unwrap_or_default();
        match code {
            429 => Err(ListflowError::RateLimited { retries: 0 }),
            400 => Err(ListflowError::OData(format!("Bad request (400): {text}"))),
            404 => Err(ListflowError::OData(format!("Resource not found (404): {text}"))),
            _ => Err(ListflowError::OData(format!("Request failed: {code} - {text}"))),
        }
    }

    async fn data_request(&self, url: &str, token: &str) -> Result<Response> {
        self.http
            .get(url)
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ListflowError::OData(format!("Network error during request: {e}")))
    }

    async fn parse_success(&self, response: Response, note: &str) -> Result<ODataResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        self.update_quota(&headers);

        let text = response.text().await.map_err(|e| {
            ListflowError::OData(format!("Invalid JSON response{note}: {e}"))
        })?;
        let body: Value = serde_json::from_str(&text).map_err(|e| {
            ListflowError::OData(format!("Invalid JSON response{note}: {e}"))
        })?;
        let Value::Object(body) = body else {
            return Err(ListflowError::OData(format!(
                "Invalid JSON response{note}: expected a JSON object"
            )));
        };

        Ok(ODataResponse { body, headers, status })
    }

    /// Refresh the quota snapshot from response headers. Responses
    /// without quota headers leave the previous snapshot in place.
    fn update_quota(&self, headers: &HashMap<String, String>) {
        let mut snapshot = QuotaSnapshot::default();
        let mut any = false;

        for (name, value) in headers {
            let target = match name.to_lowercase().as_str() {
                "minute-quota-limit" => Some((QuotaWindowKind::Minute, true)),
                "minute-quota-remaining" => Some((QuotaWindowKind::Minute, false)),
                "hour-quota-limit" => Some((QuotaWindowKind::Hour, true)),
                "hour-quota-remaining" => Some((QuotaWindowKind::Hour, false)),
                "daily-quota-limit" => Some((QuotaWindowKind::Daily, true)),
                "daily-quota-remaining" => Some((QuotaWindowKind::Daily, false)),
                _ => None,
            };

            if let Some((kind, is_limit)) = target {
                any = true;
                let reading = QuotaReading::parse(value);
                let window = snapshot.window_mut(kind);
                if is_limit {
                    window.limit = Some(reading);
                } else {
                    window.remaining = Some(reading);
                }
            }
        }

        if any {
            snapshot.updated_at = Some(Utc::now());
            *self.quota.lock().unwrap_or_else(|e| e.into_inner()) = snapshot;
        }
    }
}

#[async_trait]
impl ListingFeed for ODataClient {
    async fn fetch_all_pages(
        &self,
        resource: ResourceKind,
        query: FeedQuery,
    ) -> Result<Vec<RawRecord>> {
        let options = QueryOptions {
            filter: query.filter,
            select: query.select,
            top: query.top,
            skip: None,
            orderby: query.orderby,
        };
        self.execute_paginated_query(resource.entity_set(), &options, query.max_pages).await
    }
}

/// Exponential backoff with jitter: `base * 2^attempt`, perturbed by up
/// to ±25%, floored at zero.
fn backoff_delay(base: std::time::Duration, attempt: u32) -> std::time::Duration {
    use rand::Rng;

    let base_ms = base.as_millis() as u64;
    let delay = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = (delay as f64 * 0.25) as u64;
    let mut rng = rand::thread_rng();
    let jitter = rng.gen_range(0..=jitter_range * 2) as i64 - jitter_range as i64;

    std::time::Duration::from_millis((delay as i64 + jitter).max(0) as u64)
}
