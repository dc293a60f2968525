//! Order Sync Daemon
//!
//! Headless runner for the order sync engine: performs an initial full
//! refresh, then keeps the local store reconciled with the remote API via
//! the background poll driver, logging newly arrived orders.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin order-syncd -- [config-path]
//! ```
//!
//! The config path defaults to `order-syncd.yaml`.
//!
//! # Environment Variables
//!
//! - `ORDER_SYNC_KEY`: overrides `remote.consumer_key`
//! - `ORDER_SYNC_SECRET`: overrides `remote.consumer_secret`
//! - `RUST_LOG`: log filter (default: info)

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;

use order_sync::{AppConfig, PollDriver, SyncEngine};

/// Default configuration file path.
const DEFAULT_CONFIG_PATH: &str = "order-syncd.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config(&config_path)?;

    tracing::info!(config = %config_path, database = %config.database, "starting order sync daemon");

    let store = order_sync::OrderStore::open(&config.database)
        .await
        .context("failed to open order store")?;
    let engine = Arc::new(SyncEngine::new(config.remote_config(), store));

    // Initial full refresh. A failure here is not fatal: the store may
    // already hold a usable mirror and the poll loop will keep trying.
    match engine.refresh(None, None).await {
        Ok(orders) => tracing::info!(count = orders.len(), "initial refresh complete"),
        Err(e) => tracing::warn!(error = %e, "initial refresh failed, serving local data"),
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let (driver, mut arrivals) = PollDriver::new(Arc::clone(&engine), config.poll_config());
    let poll_handle = driver.spawn(shutdown_tx.subscribe());

    let arrivals_handle = tokio::spawn(async move {
        while let Some(batch) = arrivals.recv().await {
            for order in batch {
                tracing::info!(
                    order_id = order.id,
                    number = %order.number,
                    total = %order.total,
                    customer = %order.customer_name,
                    "new order"
                );
            }
        }
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    let _ = poll_handle.await;
    arrivals_handle.abort();

    tracing::info!("order sync daemon stopped");
    Ok(())
}

/// Initialize the tracing subscriber with environment filter.
#[allow(clippy::expect_used)]
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "order_sync=info"
                    .parse()
                    .expect("static directive 'order_sync=info' is valid"),
            ),
        )
        .init();
}

/// Load the YAML config file and apply environment overrides.
fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{path}'"))?;
    let mut config: AppConfig =
        serde_yaml_bw::from_str(&raw).context("failed to parse config YAML")?;

    if let Ok(key) = std::env::var("ORDER_SYNC_KEY") {
        config.remote.consumer_key = key;
    }
    if let Ok(secret) = std::env::var("ORDER_SYNC_SECRET") {
        config.remote.consumer_secret = secret;
    }

    Ok(config)
}

/// Wait for Ctrl+C or SIGTERM.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, initiating shutdown");
        }
    }
}
