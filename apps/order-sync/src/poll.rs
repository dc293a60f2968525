//! Background poll driver.
//!
//! Runs the engine's silent poll on a recurring timer, strictly
//! sequentially so two polls can never race on the same status partition,
//! and diffs consecutive results to detect genuinely new orders for the
//! notification collaborator.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::PollConfig;
use crate::engine::SyncEngine;
use crate::models::Order;

/// Recurring driver for the engine's silent poll path.
pub struct PollDriver {
    engine: Arc<SyncEngine>,
    config: PollConfig,
    arrivals_tx: mpsc::Sender<Vec<Order>>,
}

impl PollDriver {
    /// Create a driver and the receiver its arrivals are pushed to.
    #[must_use]
    pub fn new(engine: Arc<SyncEngine>, config: PollConfig) -> (Self, mpsc::Receiver<Vec<Order>>) {
        let (arrivals_tx, arrivals_rx) = mpsc::channel(config.arrivals_buffer);
        (
            Self {
                engine,
                config,
                arrivals_tx,
            },
            arrivals_rx,
        )
    }

    /// Spawn the poll loop. It runs until the shutdown signal fires.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The poll loop. One tick at a time: a poll that outlives its tick
    /// delays the next one rather than overlapping it.
    async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Ids already known locally never count as arrivals.
        let mut seen: HashSet<i64> = self
            .engine
            .get_cached()
            .await
            .iter()
            .map(|o| o.id)
            .collect();

        info!(
            status = %self.config.status,
            interval_secs = self.config.interval.as_secs(),
            "poll driver started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&mut seen).await;
                }
                _ = shutdown.recv() => {
                    info!("poll driver stopping");
                    break;
                }
            }
        }
    }

    async fn tick(&self, seen: &mut HashSet<i64>) {
        match self.engine.poll_status(self.config.status).await {
            Ok(orders) => {
                let fresh: Vec<Order> = orders
                    .iter()
                    .filter(|o| !seen.contains(&o.id) && !o.notification_shown)
                    .cloned()
                    .collect();
                seen.extend(orders.iter().map(|o| o.id));

                if !fresh.is_empty() {
                    info!(count = fresh.len(), "new orders arrived");
                    if self.arrivals_tx.send(fresh).await.is_err() {
                        debug!("arrivals receiver dropped, discarding batch");
                    }
                }
            }
            Err(e) if e.is_transient() => {
                warn!(error = %e, "poll failed, retrying on next tick");
            }
            Err(e) => {
                error!(error = %e, "poll failed");
            }
        }
    }
}
