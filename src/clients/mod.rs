//! Clients for the two external marketplace data sources.
//!
//! Both clients are built from explicit credentials and configuration, go
//! through one [`RateLimiter`](crate::rate_limiter::RateLimiter) per client
//! before every request, and wrap every request in the shared
//! [`retry`](crate::retry) utility. Authentication rejections abort the
//! owning fetch immediately; malformed individual records are skipped and
//! reported, never fatal to the batch.

pub mod orders;
pub mod stock;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};

use crate::errors::{SyncError, SyncErrorRecord};

pub use orders::OrderLogClient;
pub use stock::StockSnapshotClient;

/// Opaque tenant API token, passed into each client at construction.
#[derive(Clone)]
pub struct ApiCredentials {
    token: String,
}

impl ApiCredentials {
    pub fn new(token: impl Into<String>) -> Result<Self, SyncError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SyncError::Config("API token may not be empty".into()));
        }
        Ok(Self { token })
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap, SyncError> {
        let mut headers = HeaderMap::new();
        let mut value = HeaderValue::from_str(&self.token)
            .map_err(|_| SyncError::Config("API token contains invalid characters".into()))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("token", &"<redacted>")
            .finish()
    }
}

/// What one fetch produced: the decoded records plus the per-record errors
/// absorbed while decoding.
#[derive(Debug)]
pub struct FetchOutcome<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SyncErrorRecord>,
}

/// The capability both remote sources implement: fetch the full record set
/// for the current window.
#[async_trait]
pub trait RecordSource {
    type Record;

    async fn fetch(&self) -> Result<FetchOutcome<Self::Record>, SyncError>;
}

/// Build the HTTP client both sources share the shape of: default headers
/// carrying the token, bounded per-request timeout.
pub(crate) fn build_http_client(
    credentials: &ApiCredentials,
    request_timeout: Duration,
) -> Result<Client, SyncError> {
    Client::builder()
        .default_headers(credentials.headers()?)
        .timeout(request_timeout)
        .build()
        .map_err(SyncError::Http)
}

/// Map a non-success HTTP status to the engine error taxonomy: 401/403 are
/// fatal auth errors, 429 and 5xx are transient, anything else is an
/// unexpected response.
pub(crate) fn classify_status(
    service: &'static str,
    status: StatusCode,
    body: &str,
) -> SyncError {
    let message = format!("{status}: {}", truncate(body, 200));
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        SyncError::Auth { service, message }
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SyncError::Transient { service, message }
    } else {
        SyncError::UnexpectedResponse { service, message }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_token() {
        assert!(ApiCredentials::new("  ").is_err());
        assert!(ApiCredentials::new("ey.token").is_ok());
    }

    #[test]
    fn debug_redacts_token() {
        let creds = ApiCredentials::new("super-secret").unwrap();
        let rendered = format!("{creds:?}");
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn status_classification() {
        let err = classify_status("orders", StatusCode::UNAUTHORIZED, "no");
        assert!(matches!(err, SyncError::Auth { .. }));

        let err = classify_status("orders", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(err.is_transient());

        let err = classify_status("orders", StatusCode::BAD_GATEWAY, "");
        assert!(err.is_transient());

        let err = classify_status("orders", StatusCode::NOT_FOUND, "missing");
        assert!(matches!(err, SyncError::UnexpectedResponse { .. }));
    }
}
