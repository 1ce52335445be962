//! Order log client.
//!
//! The order endpoint is synchronous and date-filtered: one request per
//! page, starting from `now - lookback`, following the `next` cursor until
//! the server reports no more pages. Cancelled orders are decoded with
//! their flag intact; excluding them from counts is the aggregator's job.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::clients::{build_http_client, classify_status, ApiCredentials, FetchOutcome, RecordSource};
use crate::config::SyncConfig;
use crate::errors::SyncError;
use crate::models::{OrderEvent, ProductIdentity};
use crate::rate_limiter::RateLimiter;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "orders";

/// Order subset selector forwarded to the endpoint's `flag` parameter:
/// 0 requests every order touched within the window.
const DEFAULT_SUBSET_FLAG: u8 = 0;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderPage {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    next: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticles {
    #[serde(default)]
    seller_article: Option<String>,
    #[serde(default)]
    marketplace_article: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrderRow {
    #[serde(default)]
    product_articles: Option<RawArticles>,
    #[serde(default)]
    warehouse_name: Option<String>,
    #[serde(default)]
    is_cancelled: Option<bool>,
}

/// Client for the paginated, date-ranged order log API.
pub struct OrderLogClient {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
    lookback: chrono::Duration,
    subset_flag: u8,
}

impl OrderLogClient {
    pub fn new(config: &SyncConfig, credentials: &ApiCredentials) -> Result<Self, SyncError> {
        Ok(Self {
            http: build_http_client(credentials, config.request_timeout())?,
            base_url: config.orders_api_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.rate_limit_config()),
            retry: config.retry_policy(),
            lookback: config.lookback(),
            subset_flag: DEFAULT_SUBSET_FLAG,
        })
    }

    /// Select a different order subset (endpoint `flag` parameter).
    pub fn with_subset_flag(mut self, flag: u8) -> Self {
        self.subset_flag = flag;
        self
    }

    async fn fetch_page(&self, date_from: &str, next: u64) -> Result<OrderPage, SyncError> {
        let url = format!("{}/api/v1/orders", self.base_url);
        retry_with_backoff(&self.retry, "orders.fetch_page", || async {
            self.limiter.acquire().await;
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("dateFrom", date_from.to_string()),
                    ("flag", self.subset_flag.to_string()),
                    ("next", next.to_string()),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_status(SERVICE, status, &body));
            }
            response
                .json::<OrderPage>()
                .await
                .map_err(|e| SyncError::Decode {
                    service: SERVICE,
                    message: e.to_string(),
                })
        })
        .await
    }

    fn decode_row(row: Value) -> Result<OrderEvent, SyncError> {
        let raw: RawOrderRow =
            serde_json::from_value(row).map_err(|e| SyncError::MalformedRecord {
                origin: SERVICE,
                reason: e.to_string(),
            })?;

        let articles = raw.product_articles.ok_or(SyncError::MalformedRecord {
            origin: SERVICE,
            reason: "missing productArticles".into(),
        })?;
        let seller_article = articles
            .seller_article
            .filter(|s| !s.trim().is_empty())
            .ok_or(SyncError::MalformedRecord {
                origin: SERVICE,
                reason: "missing sellerArticle".into(),
            })?;
        let marketplace_article =
            articles.marketplace_article.ok_or(SyncError::MalformedRecord {
                origin: SERVICE,
                reason: "missing marketplaceArticle".into(),
            })?;
        let warehouse_name = raw.warehouse_name.ok_or(SyncError::MalformedRecord {
            origin: SERVICE,
            reason: "missing warehouseName".into(),
        })?;

        Ok(OrderEvent {
            product: ProductIdentity::new(seller_article, marketplace_article),
            warehouse_name,
            is_cancelled: raw.is_cancelled.unwrap_or(false),
        })
    }
}

#[async_trait]
impl RecordSource for OrderLogClient {
    type Record = OrderEvent;

    /// Walk every page of the look-back window, decoding rows individually
    /// and skipping malformed ones.
    #[instrument(skip(self), fields(service = SERVICE))]
    async fn fetch(&self) -> Result<FetchOutcome<OrderEvent>, SyncError> {
        let date_from =
            (Utc::now() - self.lookback).to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut outcome = FetchOutcome {
            records: Vec::new(),
            skipped: Vec::new(),
        };

        let mut cursor = 0u64;
        loop {
            let page = self.fetch_page(&date_from, cursor).await?;
            let page_len = page.data.len();
            for row in page.data {
                match Self::decode_row(row) {
                    Ok(event) => outcome.records.push(event),
                    Err(err) => outcome
                        .skipped
                        .push(err.into_record(Some("order log row".into()))),
                }
            }
            debug!(cursor, page_len, "order log page consumed");

            match page.next {
                Some(next) if next != 0 && page_len > 0 => cursor = next,
                _ => break,
            }
        }

        info!(
            records = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "order log fetched"
        );
        Ok(outcome)
    }
}
