//! Integration tests for the background poll driver.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use order_sync::{OrderStore, PollConfig, PollDriver, RemoteConfig, SyncEngine};

const ORDERS_PATH: &str = "/wp-json/wc/v3/orders";

fn order_json(id: i64) -> serde_json::Value {
    json!({
        "id": id,
        "number": id.to_string(),
        "status": "processing",
        "date_created": (Utc::now() - chrono::Duration::hours(1))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
        "total": "12.00",
        "billing": {"first_name": "Pat", "last_name": "Doe"},
        "shipping": {},
        "line_items": []
    })
}

async fn engine_with(server: &MockServer) -> Arc<SyncEngine> {
    let store = OrderStore::open_in_memory().await.unwrap();
    let config = RemoteConfig::new(server.uri(), "ck_test", "cs_test");
    Arc::new(SyncEngine::new(config, store))
}

#[tokio::test]
async fn driver_reports_new_orders_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .and(query_param("status", "processing"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([order_json(7), order_json(8)])),
        )
        .mount(&server)
        .await;

    let engine = engine_with(&server).await;
    let poll_config = PollConfig::default().with_interval(Duration::from_millis(50));
    let (driver, mut arrivals) = PollDriver::new(Arc::clone(&engine), poll_config);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let handle = driver.spawn(shutdown_tx.subscribe());

    // First poll: both orders are new.
    let batch = tokio::time::timeout(Duration::from_secs(2), arrivals.recv())
        .await
        .unwrap()
        .unwrap();
    let mut ids: Vec<i64> = batch.iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![7, 8]);

    // Subsequent polls see the same remote set: no repeat arrivals.
    let repeat = tokio::time::timeout(Duration::from_millis(300), arrivals.recv()).await;
    assert!(repeat.is_err(), "known orders must not be re-reported");

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn driver_ignores_orders_already_known_locally() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([order_json(7)])))
        .mount(&server)
        .await;

    let engine = engine_with(&server).await;
    // Order 7 enters the mirror before the driver starts.
    engine.refresh(None, None).await.unwrap();

    let poll_config = PollConfig::default().with_interval(Duration::from_millis(50));
    let (driver, mut arrivals) = PollDriver::new(Arc::clone(&engine), poll_config);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let handle = driver.spawn(shutdown_tx.subscribe());

    let batch = tokio::time::timeout(Duration::from_millis(300), arrivals.recv()).await;
    assert!(batch.is_err(), "pre-existing orders are not arrivals");

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}

#[tokio::test]
async fn driver_keeps_polling_after_transient_failures() {
    let server = MockServer::start().await;
    // Two failures, then success.
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(ORDERS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([order_json(9)])))
        .mount(&server)
        .await;

    let engine = engine_with(&server).await;
    let poll_config = PollConfig::default().with_interval(Duration::from_millis(50));
    let (driver, mut arrivals) = PollDriver::new(Arc::clone(&engine), poll_config);

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let handle = driver.spawn(shutdown_tx.subscribe());

    let batch = tokio::time::timeout(Duration::from_secs(2), arrivals.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch[0].id, 9);

    let _ = shutdown_tx.send(());
    handle.await.unwrap();
}
