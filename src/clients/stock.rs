//! Stock snapshot client.
//!
//! The warehouse-stock endpoint is asynchronous on the marketplace side:
//! the client submits a report task, polls its status at a bounded
//! interval, then downloads the finished payload. The poll loop has a hard
//! deadline; on timeout the fetch step fails with a distinct poll-timeout
//! error and the task is never re-created.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

use crate::clients::{build_http_client, classify_status, ApiCredentials, FetchOutcome, RecordSource};
use crate::config::SyncConfig;
use crate::errors::{SyncError, TimeoutScope};
use crate::models::{ProductIdentity, StockRecord, StockWarehouse};
use crate::rate_limiter::RateLimiter;
use crate::retry::{retry_with_backoff, RetryPolicy};

const SERVICE: &str = "stock";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskCreated {
    task_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskStatus {
    status: String,
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
struct RawStockWarehouse {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    quantity: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStockRow {
    #[serde(default)]
    product_articles: Option<RawArticles>,
    #[serde(default)]
    warehouses: Option<Vec<RawStockWarehouse>>,
}

/// Client for the task-based stock report API.
pub struct StockSnapshotClient {
    http: Client,
    base_url: String,
    limiter: RateLimiter,
    retry: RetryPolicy,
    poll_interval: std::time::Duration,
    poll_timeout: std::time::Duration,
}

impl StockSnapshotClient {
    pub fn new(config: &SyncConfig, credentials: &ApiCredentials) -> Result<Self, SyncError> {
        Ok(Self {
            http: build_http_client(credentials, config.request_timeout())?,
            base_url: config.stock_api_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.rate_limit_config()),
            retry: config.retry_policy(),
            poll_interval: config.poll_interval(),
            poll_timeout: config.poll_timeout(),
        })
    }

    #[instrument(skip(self))]
    async fn create_task(&self) -> Result<String, SyncError> {
        let url = format!("{}/api/v1/stocks/report", self.base_url);
        let created: TaskCreated = retry_with_backoff(&self.retry, "stock.create_task", || async {
            self.limiter.acquire().await;
            let response = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "groupByWarehouse": true }))
                .send()
                .await?;
            decode_response(response).await
        })
        .await?;
        info!(task_id = %created.task_id, "stock report task created");
        Ok(created.task_id)
    }

    /// Poll task status until `done`, bounded by the configured deadline.
    #[instrument(skip(self))]
    async fn await_task(&self, task_id: &str) -> Result<(), SyncError> {
        let url = format!("{}/api/v1/stocks/report/{}/status", self.base_url, task_id);
        let started = Instant::now();

        loop {
            let status: TaskStatus =
                retry_with_backoff(&self.retry, "stock.poll_status", || async {
                    self.limiter.acquire().await;
                    let response = self.http.get(&url).send().await?;
                    decode_response(response).await
                })
                .await?;

            match status.status.as_str() {
                "done" => return Ok(()),
                "error" | "purged" => {
                    return Err(SyncError::UnexpectedResponse {
                        service: SERVICE,
                        message: format!("report task {task_id} ended in state {}", status.status),
                    })
                }
                other => {
                    debug!(task_id, state = other, "stock report not ready");
                }
            }

            if started.elapsed() + self.poll_interval >= self.poll_timeout {
                return Err(SyncError::Timeout {
                    scope: TimeoutScope::StockPoll,
                    elapsed_secs: started.elapsed().as_secs(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    #[instrument(skip(self))]
    async fn download(&self, task_id: &str) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/api/v1/stocks/report/{}/download", self.base_url, task_id);
        retry_with_backoff(&self.retry, "stock.download", || async {
            self.limiter.acquire().await;
            let response = self.http.get(&url).send().await?;
            decode_response(response).await
        })
        .await
    }

    fn decode_row(row: Value) -> Result<StockRecord, SyncError> {
        let raw: RawStockRow =
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

        let mut warehouses = Vec::new();
        for line in raw.warehouses.unwrap_or_default() {
            let name = line.name.ok_or(SyncError::MalformedRecord {
                origin: SERVICE,
                reason: "warehouse line missing name".into(),
            })?;
            let quantity = match line.quantity {
                Some(q) => u32::try_from(q).map_err(|_| SyncError::MalformedRecord {
                    origin: SERVICE,
                    reason: format!("quantity {q} out of range at warehouse {name}"),
                })?,
                None => 0,
            };
            warehouses.push(StockWarehouse { name, quantity });
        }

        Ok(StockRecord {
            product: ProductIdentity::new(seller_article, marketplace_article),
            warehouses,
        })
    }
}

#[async_trait]
impl RecordSource for StockSnapshotClient {
    type Record = StockRecord;

    /// Run the full create / poll / download protocol and decode the
    /// payload row by row, skipping malformed rows.
    #[instrument(skip(self), fields(service = SERVICE))]
    async fn fetch(&self) -> Result<FetchOutcome<StockRecord>, SyncError> {
        let task_id = self.create_task().await?;
        self.await_task(&task_id).await?;
        let rows = self.download(&task_id).await?;

        let mut outcome = FetchOutcome {
            records: Vec::with_capacity(rows.len()),
            skipped: Vec::new(),
        };
        for row in rows {
            match Self::decode_row(row) {
                Ok(record) => outcome.records.push(record),
                Err(err) => outcome
                    .skipped
                    .push(err.into_record(Some("stock report row".into()))),
            }
        }
        info!(
            records = outcome.records.len(),
            skipped = outcome.skipped.len(),
            "stock snapshot fetched"
        );
        Ok(outcome)
    }
}

async fn decode_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SyncError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(SERVICE, status, &body));
    }
    response.json::<T>().await.map_err(|e| SyncError::Decode {
        service: SERVICE,
        message: e.to_string(),
    })
}
