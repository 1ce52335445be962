//! End-to-end reconciliation runs against mock upstreams.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stocksync::{
    ApiCredentials, FinalizedProduct, ProductSink, SessionStatus, SessionTracker, SyncError,
    SyncService, SyncSession, TriggerSource,
};
use tokio::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_stock_happy(server: &MockServer, rows: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path("/api/v1/stocks/report"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"taskId": "t-1"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stocks/report/t-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stocks/report/t-1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(rows))
        .mount(server)
        .await;
}

async fn mount_orders(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

fn service(stock: &MockServer, orders: &MockServer) -> SyncService {
    let config = common::test_config(&stock.uri(), &orders.uri());
    let credentials = ApiCredentials::new("test-token").unwrap();
    SyncService::new(config, &credentials, Arc::new(SessionTracker::new())).unwrap()
}

#[tokio::test]
async fn full_run_completes_with_merged_products() {
    let stock = MockServer::start().await;
    let orders = MockServer::start().await;

    mount_stock_happy(
        &stock,
        json!([{
            "productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 12345678},
            "warehouses": [{"name": "Краснодар", "quantity": 52}]
        }]),
    )
    .await;
    mount_orders(
        &orders,
        json!({
            "data": [
                {"productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 12345678},
                 "warehouseName": "Краснодар", "isCancelled": false},
                {"productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 12345678},
                 "warehouseName": "Чехов", "isCancelled": false},
                {"productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 12345678},
                 "warehouseName": "Чехов", "isCancelled": true}
            ],
            "next": 0
        }),
    )
    .await;

    let outcome = service(&stock, &orders)
        .run("tenant-1", TriggerSource::Manual)
        .await
        .unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Completed);
    assert_eq!(outcome.session.products_processed, 1);
    assert!(outcome.session.errors.is_empty());

    let product = &outcome.products[0];
    assert_eq!(product.total_stock, 52);
    // The cancelled Чехов event does not count.
    assert_eq!(product.total_orders, 2);
    assert_eq!(product.warehouses.len(), 2);
}

#[tokio::test]
async fn orders_auth_failure_yields_failed_session_with_stock_products() {
    let stock = MockServer::start().await;
    let orders = MockServer::start().await;

    mount_stock_happy(
        &stock,
        json!([{
            "productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 1},
            "warehouses": [{"name": "Казань", "quantity": 10}]
        }]),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/orders"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&orders)
        .await;

    let outcome = service(&stock, &orders)
        .run("tenant-1", TriggerSource::Scheduled)
        .await
        .unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Failed);
    assert!(outcome
        .session
        .errors
        .iter()
        .any(|e| e.code == "auth_failed"));

    // Stock-derived products are still returned, with zero orders.
    assert_eq!(outcome.products.len(), 1);
    assert_eq!(outcome.products[0].total_stock, 10);
    assert_eq!(outcome.products[0].total_orders, 0);
}

#[tokio::test]
async fn run_timeout_fails_the_session_with_distinct_code() {
    let stock = MockServer::start().await;
    let orders = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/stocks/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"taskId": "t-1"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&stock)
        .await;
    mount_orders(&orders, json!({"data": [], "next": 0})).await;

    let mut config = common::test_config(&stock.uri(), &orders.uri());
    config.run_timeout_secs = 1;
    let credentials = ApiCredentials::new("test-token").unwrap();
    let svc = SyncService::new(config, &credentials, Arc::new(SessionTracker::new())).unwrap();

    let outcome = svc.run("tenant-1", TriggerSource::Manual).await.unwrap();

    assert_eq!(outcome.session.status, SessionStatus::Failed);
    assert!(outcome
        .session
        .errors
        .iter()
        .any(|e| e.code == "run_timeout"));
    assert!(outcome.products.is_empty());
}

#[tokio::test]
async fn concurrent_trigger_is_refused_while_running() {
    let stock = MockServer::start().await;
    let orders = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/stocks/report"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"taskId": "t-1"}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&stock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stocks/report/t-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "done"})))
        .mount(&stock)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/stocks/report/t-1/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&stock)
        .await;
    mount_orders(&orders, json!({"data": [], "next": 0})).await;

    let svc = Arc::new(service(&stock, &orders));
    let first = {
        let svc = svc.clone();
        tokio::spawn(async move { svc.run("tenant-1", TriggerSource::Scheduled).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = svc.run("tenant-1", TriggerSource::Manual).await;
    assert!(matches!(second, Err(SyncError::AlreadyRunning(_))));

    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome.session.status, SessionStatus::Completed);

    // After the first run finishes, a new trigger is admitted.
    assert!(svc.run("tenant-1", TriggerSource::Manual).await.is_ok());
}

#[derive(Default)]
struct CollectingSink {
    delivered: Mutex<Vec<(Vec<FinalizedProduct>, SessionStatus)>>,
}

#[async_trait::async_trait]
impl ProductSink for CollectingSink {
    async fn deliver(
        &self,
        products: &[FinalizedProduct],
        session: &SyncSession,
    ) -> Result<(), SyncError> {
        self.delivered
            .lock()
            .await
            .push((products.to_vec(), session.status));
        Ok(())
    }
}

#[tokio::test]
async fn run_into_hands_outcome_to_sink() {
    let stock = MockServer::start().await;
    let orders = MockServer::start().await;

    mount_stock_happy(
        &stock,
        json!([{
            "productArticles": {"sellerArticle": "WB001", "marketplaceArticle": 1},
            "warehouses": [{"name": "Казань", "quantity": 4}]
        }]),
    )
    .await;
    mount_orders(&orders, json!({"data": [], "next": 0})).await;

    let sink = CollectingSink::default();
    let outcome = service(&stock, &orders)
        .run_into("tenant-1", TriggerSource::Manual, &sink)
        .await
        .unwrap();

    let delivered = sink.delivered.lock().await;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, outcome.products);
    assert_eq!(delivered[0].1, SessionStatus::Completed);
}
