//! In-memory reactive cache with copy-on-write snapshots.
//!
//! The cache holds the last-known full order list as an immutable snapshot
//! behind a `watch` channel: writers replace the whole snapshot, readers
//! borrow it without blocking and never observe a half-updated list.
//! Per-id channels are created lazily on first subscription.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::models::Order;
use crate::status::OrderStatus;

/// Shared immutable view of the full order list.
pub type Snapshot = Arc<Vec<Order>>;

/// Reactive cache and subscription manager.
#[derive(Debug)]
pub struct OrderCache {
    all_tx: watch::Sender<Snapshot>,
    by_id: Mutex<HashMap<i64, watch::Sender<Option<Order>>>>,
}

impl Default for OrderCache {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let (all_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            all_tx,
            by_id: Mutex::new(HashMap::new()),
        }
    }

    /// The current snapshot. Never blocks.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.all_tx.borrow().clone()
    }

    /// Replace the full snapshot and notify subscribers. Per-id channels
    /// with a counterpart in the new snapshot are refreshed too.
    pub fn replace_all(&self, orders: Vec<Order>) {
        let snapshot: Snapshot = Arc::new(orders);
        self.all_tx.send_replace(snapshot.clone());
        self.refresh_id_channels(&snapshot);
    }

    /// Replace one status partition of the snapshot: entries of `status`
    /// are swapped for `orders`, everything else is kept. The result is
    /// published as one new snapshot, newest first.
    pub fn replace_partition(&self, status: OrderStatus, orders: Vec<Order>) {
        let current = self.snapshot();
        let mut merged: Vec<Order> = current
            .iter()
            .filter(|o| o.status != status)
            .cloned()
            .collect();
        merged.extend(orders);
        merged.sort_by(|a, b| b.date_created.cmp(&a.date_created));
        self.replace_all(merged);
    }

    /// Apply a mutation to one cached entry, publishing a new snapshot.
    /// Returns false when the entry is not cached. Does not touch per-id
    /// channels; callers notify those with the authoritative store record.
    pub fn patch(&self, id: i64, mutate: impl FnOnce(&mut Order)) -> bool {
        let current = self.snapshot();
        let Some(index) = current.iter().position(|o| o.id == id) else {
            return false;
        };

        let mut next = (*current).clone();
        mutate(&mut next[index]);
        self.all_tx.send_replace(Arc::new(next));
        true
    }

    /// Apply a mutation to every cached entry and refresh all per-id
    /// channels from the result.
    pub fn patch_all(&self, mutate: impl Fn(&mut Order)) {
        let current = self.snapshot();
        let mut next = (*current).clone();
        for order in &mut next {
            mutate(order);
        }
        let snapshot: Snapshot = Arc::new(next);
        self.all_tx.send_replace(snapshot.clone());
        self.refresh_id_channels(&snapshot);
    }

    /// Push a value to one per-id channel, if anyone ever subscribed to it.
    pub fn set_id(&self, id: i64, value: Option<Order>) {
        #[allow(clippy::unwrap_used)] // mutex poisoning is a programming error
        let channels = self.by_id.lock().unwrap();
        if let Some(tx) = channels.get(&id) {
            tx.send_replace(value);
        }
    }

    /// Receiver for the full-list snapshot.
    #[must_use]
    pub fn subscribe_all(&self) -> watch::Receiver<Snapshot> {
        self.all_tx.subscribe()
    }

    /// Receiver for one order's channel, creating it on first use.
    /// The second element is true when this call created the channel and
    /// the caller should prime it from the store.
    #[must_use]
    pub fn subscribe_id(&self, id: i64) -> (watch::Receiver<Option<Order>>, bool) {
        #[allow(clippy::unwrap_used)] // mutex poisoning is a programming error
        let mut channels = self.by_id.lock().unwrap();
        if let Some(tx) = channels.get(&id) {
            return (tx.subscribe(), false);
        }

        let initial = self.snapshot().iter().find(|o| o.id == id).cloned();
        let needs_prime = initial.is_none();
        let (tx, rx) = watch::channel(initial);
        channels.insert(id, tx);
        (rx, needs_prime)
    }

    /// Empty the snapshot and reset every per-id channel.
    pub fn clear(&self) {
        self.all_tx.send_replace(Arc::new(Vec::new()));
        #[allow(clippy::unwrap_used)] // mutex poisoning is a programming error
        let channels = self.by_id.lock().unwrap();
        for tx in channels.values() {
            tx.send_replace(None);
        }
    }

    fn refresh_id_channels(&self, snapshot: &Snapshot) {
        #[allow(clippy::unwrap_used)] // mutex poisoning is a programming error
        let channels = self.by_id.lock().unwrap();
        for (id, tx) in channels.iter() {
            if let Some(order) = snapshot.iter().find(|o| o.id == *id) {
                tx.send_replace(Some(order.clone()));
            }
        }
    }
}
