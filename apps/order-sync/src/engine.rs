//! The reconciliation engine.
//!
//! Serializes every store+cache write behind one async lock, fetches fully
//! before writing (a failed fetch leaves the store exactly as it was), and
//! merges remote snapshots with the locally-owned flags of whatever record
//! already exists. Two refresh paths exist: the UI-facing one (§`refresh`)
//! that replaces the reactive cache and notifies subscribers, and the
//! silent polling one (§`poll_status`) that writes the store but leaves
//! the cache untouched.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::cache::{OrderCache, Snapshot};
use crate::config::RemoteConfig;
use crate::error::SyncError;
use crate::models::Order;
use crate::remote::{OrderDto, OrdersClient};
use crate::status::OrderStatus;
use crate::store::OrderStore;

/// Order synchronization and cache-reconciliation engine.
pub struct SyncEngine {
    remote: RemoteConfig,
    store: OrderStore,
    cache: Arc<OrderCache>,
    /// Serializes all writes to the store and the cache snapshot.
    /// Reads of the current snapshot never take this.
    write_lock: Mutex<()>,
    /// Whether the cache has been primed from store or remote at least once.
    primed: AtomicBool,
}

impl SyncEngine {
    /// Create an engine over an opened store.
    #[must_use]
    pub fn new(remote: RemoteConfig, store: OrderStore) -> Self {
        Self {
            remote,
            store,
            cache: Arc::new(OrderCache::new()),
            write_lock: Mutex::new(()),
            primed: AtomicBool::new(false),
        }
    }

    // ------------------------------------------------------------------
    // Refresh
    // ------------------------------------------------------------------

    /// Fetch remote orders, merge them with local state, persist, update
    /// the reactive cache and notify subscribers.
    ///
    /// With no `status_filter` the full local set is replaced by the
    /// merged set using upsert-by-id (absent ids are kept; eviction is the
    /// poll path's job). With a filter, only that status partition is
    /// replaced. Idempotent and safe to retry.
    pub async fn refresh(
        &self,
        status_filter: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Order>, SyncError> {
        self.remote.validate()?;

        let requested = status_filter.map(OrderStatus::normalize);
        let client = OrdersClient::new(&self.remote)?;

        // Fetch everything up front: no store write happens until the
        // remote snapshot is fully in hand.
        let (dtos, effective) = match client.list_orders(requested, since).await {
            Ok(dtos) => (dtos, requested),
            Err(SyncError::InvalidParameter(detail))
                if requested.is_some_and(|s| !s.is_wildcard()) =>
            {
                warn!(
                    status = ?requested,
                    detail = %detail,
                    "remote rejected status filter, retrying with wildcard"
                );
                let dtos = client.list_orders(Some(OrderStatus::Any), since).await?;
                (dtos, Some(OrderStatus::Any))
            }
            Err(e) => return Err(e),
        };

        // The partition being replaced on disk; wildcard and no-filter
        // both mean "all statuses", which is never partition-replaced.
        let partition = effective.filter(|s| !s.is_wildcard());

        let _guard = self.write_lock.lock().await;

        let cache_by_id = index_by_id(&self.cache.snapshot());
        let disk_by_id: HashMap<i64, Order> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let merged = merge_with_local(
            dtos.iter().map(OrderDto::to_order),
            &cache_by_id,
            &disk_by_id,
            Utc::now(),
        );

        match partition {
            None => {
                self.store.upsert_all(&merged).await?;
                self.cache.replace_all(merged.clone());
            }
            Some(status) => {
                // The server may ignore the filter; only records that
                // actually carry the requested status enter the partition.
                let matching: Vec<Order> = merged
                    .iter()
                    .filter(|o| o.status == status)
                    .cloned()
                    .collect();
                self.store.replace_status(status, &matching).await?;
                self.cache.replace_partition(status, matching);
            }
        }
        self.primed.store(true, Ordering::Release);

        let result = filter_by_requested(merged, requested);
        info!(
            status = ?status_filter,
            count = result.len(),
            "refresh complete"
        );
        Ok(result)
    }

    /// Refresh one status. Equivalent to `refresh(Some(status), None)`.
    pub async fn refresh_by_status(&self, status: &str) -> Result<Vec<Order>, SyncError> {
        self.refresh(Some(status), None).await
    }

    // ------------------------------------------------------------------
    // Silent poll
    // ------------------------------------------------------------------

    /// Background reconciliation of one fixed status.
    ///
    /// Writes merged results to the store and evicts local records of
    /// `status` that no longer appear remotely, but never touches the
    /// reactive cache or notifies subscribers: whatever the UI currently
    /// displays stays put. Flag conflicts between the in-memory cache and
    /// the on-disk record resolve in the cache's favor (it may be ahead of
    /// the last disk write during heavy interaction). Returns the
    /// reconciled list so the caller can diff for arrivals.
    pub async fn poll_status(&self, status: OrderStatus) -> Result<Vec<Order>, SyncError> {
        self.remote.validate()?;
        if status.is_wildcard() {
            return Err(SyncError::InvalidParameter(
                "cannot poll the wildcard status".to_string(),
            ));
        }

        let client = OrdersClient::new(&self.remote)?;
        let dtos = client.list_orders(Some(status), None).await?;

        let _guard = self.write_lock.lock().await;

        let cache_by_id = index_by_id(&self.cache.snapshot());
        let disk_by_id: HashMap<i64, Order> = self
            .store
            .all()
            .await?
            .into_iter()
            .map(|o| (o.id, o))
            .collect();

        let merged: Vec<Order> = merge_with_local(
            dtos.iter().map(OrderDto::to_order),
            &cache_by_id,
            &disk_by_id,
            Utc::now(),
        )
        .into_iter()
        .filter(|o| o.status == status)
        .collect();

        let evicted = self.store.reconcile_status(status, &merged).await?;
        debug!(
            status = %status,
            fetched = merged.len(),
            evicted = evicted.len(),
            "silent poll reconciled"
        );

        Ok(merged)
    }

    // ------------------------------------------------------------------
    // Local flag mutation
    // ------------------------------------------------------------------

    /// Set the printed flag. Returns false when no record exists (a no-op,
    /// not an error).
    pub async fn set_printed(&self, id: i64, printed: bool) -> Result<bool, SyncError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.set_printed(id, printed).await?;
        if existed {
            self.cache.patch(id, |o| o.is_printed = printed);
            self.notify_id_from_store(id).await?;
        }
        Ok(existed)
    }

    /// Set the read flag. Returns false when no record exists.
    pub async fn set_read(&self, id: i64, read: bool) -> Result<bool, SyncError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.set_read(id, read).await?;
        if existed {
            self.cache.patch(id, |o| o.is_read = read);
            self.notify_id_from_store(id).await?;
        }
        Ok(existed)
    }

    /// Mark the arrival notification as shown. One-directional: true only.
    /// Returns false when no record exists.
    pub async fn mark_notification_shown(&self, id: i64) -> Result<bool, SyncError> {
        let _guard = self.write_lock.lock().await;
        let existed = self.store.set_notification_shown(id).await?;
        if existed {
            self.cache.patch(id, |o| o.notification_shown = true);
            self.notify_id_from_store(id).await?;
        }
        Ok(existed)
    }

    /// Mark every order read. Returns the number of store rows touched.
    pub async fn mark_all_read(&self) -> Result<u64, SyncError> {
        let _guard = self.write_lock.lock().await;
        let touched = self.store.mark_all_read().await?;
        self.cache.patch_all(|o| o.is_read = true);
        Ok(touched)
    }

    /// Push the authoritative store record to the per-id subscription.
    async fn notify_id_from_store(&self, id: i64) -> Result<(), SyncError> {
        if let Some(order) = self.store.get(id).await? {
            self.cache.set_id(id, Some(order));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Subscriptions and queries
    // ------------------------------------------------------------------

    /// Stream of full-list snapshots, starting with the current one.
    pub fn subscribe_all(&self) -> impl Stream<Item = Snapshot> + Unpin + use<> {
        WatchStream::new(self.cache.subscribe_all())
    }

    /// Stream of snapshots filtered to one status token. Matching uses the
    /// normalizer's rule, so a localized token selects the same orders as
    /// its canonical code.
    pub fn subscribe_by_status(
        &self,
        status: &str,
    ) -> impl Stream<Item = Vec<Order>> + Unpin + use<> {
        let token = status.to_string();
        WatchStream::new(self.cache.subscribe_all()).map(move |snapshot| {
            snapshot
                .iter()
                .filter(|o| o.status.matches(&token))
                .cloned()
                .collect()
        })
    }

    /// Stream of one order's state, created on first use and primed
    /// asynchronously from the store when not yet cached.
    pub fn subscribe_by_id(&self, id: i64) -> impl Stream<Item = Option<Order>> + Unpin + use<> {
        let (rx, needs_prime) = self.cache.subscribe_id(id);
        if needs_prime {
            let store = self.store.clone();
            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                match store.get(id).await {
                    Ok(Some(order)) => cache.set_id(id, Some(order)),
                    Ok(None) => {}
                    Err(e) => warn!(order_id = id, error = %e, "failed to prime id subscription"),
                }
            });
        }
        WatchStream::new(rx)
    }

    /// The last-known order list without touching the network. Loads from
    /// the store on first use; store read failures degrade to the current
    /// (possibly empty) snapshot.
    pub async fn get_cached(&self) -> Vec<Order> {
        if self.primed.load(Ordering::Acquire) {
            return (*self.cache.snapshot()).clone();
        }

        match self.store.all().await {
            Ok(orders) => {
                let _guard = self.write_lock.lock().await;
                self.cache.replace_all(orders.clone());
                self.primed.store(true, Ordering::Release);
                orders
            }
            Err(e) => {
                error!(error = %e, "failed to load cached orders from store");
                (*self.cache.snapshot()).clone()
            }
        }
    }

    /// Case-insensitive multi-term search over the cached snapshot. Every
    /// term must match the customer name, contact info, or order number.
    pub async fn search(&self, query: &str) -> Vec<Order> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        self.get_cached()
            .await
            .into_iter()
            .filter(|order| {
                let name = order.customer_name.to_lowercase();
                let contact = order.contact_info.to_lowercase();
                terms.iter().all(|term| {
                    name.contains(term) || contact.contains(term) || order.number.contains(term)
                })
            })
            .collect()
    }

    /// Number of unread orders in the store.
    pub async fn unread_count(&self) -> Result<i64, SyncError> {
        self.store.unread_count().await
    }

    /// Empty the store and the cache. Used on account/config change.
    pub async fn clear_cache(&self) -> Result<(), SyncError> {
        let _guard = self.write_lock.lock().await;
        self.store.clear().await?;
        self.cache.clear();
        self.primed.store(false, Ordering::Release);
        info!("store and cache cleared");
        Ok(())
    }

    /// Probe the remote API with a one-record request.
    pub async fn test_connection(&self) -> bool {
        match OrdersClient::new(&self.remote) {
            Ok(client) => client.probe().await.is_ok(),
            Err(e) => {
                warn!(error = %e, "connection test failed before reaching the network");
                false
            }
        }
    }
}

/// Merge incoming remote records with local state.
///
/// For each record with an existing local counterpart the locally-owned
/// flags are carried over, consulting the in-memory cache first and the
/// on-disk record second (the cache may be ahead of the last disk write).
/// Records never seen before get the 30-day read-backlog default.
fn merge_with_local(
    incoming: impl Iterator<Item = Order>,
    cache_by_id: &HashMap<i64, Order>,
    disk_by_id: &HashMap<i64, Order>,
    now: DateTime<Utc>,
) -> Vec<Order> {
    incoming
        .map(|mut order| {
            if let Some(prior) = cache_by_id.get(&order.id).or_else(|| disk_by_id.get(&order.id)) {
                order.adopt_local_flags(prior);
            } else {
                order.apply_read_backlog_default(now);
            }
            order
        })
        .collect()
}

/// Apply the caller's requested filter to the merged result list.
fn filter_by_requested(merged: Vec<Order>, requested: Option<OrderStatus>) -> Vec<Order> {
    match requested {
        Some(status) if !status.is_wildcard() => {
            merged.into_iter().filter(|o| o.status == status).collect()
        }
        _ => merged,
    }
}

fn index_by_id(snapshot: &Snapshot) -> HashMap<i64, Order> {
    snapshot.iter().map(|o| (o.id, o.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn make_order(id: i64, status: OrderStatus) -> Order {
        Order {
            id,
            number: id.to_string(),
            status,
            date_created: Utc::now(),
            customer_name: "Customer".to_string(),
            contact_info: String::new(),
            billing_address: String::new(),
            shipping_address: String::new(),
            payment_method: String::new(),
            payment_method_title: String::new(),
            customer_note: String::new(),
            total: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            discount_total: Decimal::ZERO,
            line_items: vec![],
            fee_lines: vec![],
            tax_lines: vec![],
            is_printed: false,
            is_read: false,
            notification_shown: false,
            delivery: None,
        }
    }

    #[test]
    fn merge_prefers_cache_flags_over_disk() {
        let mut cached = make_order(1, OrderStatus::Processing);
        cached.is_printed = true;
        let mut on_disk = make_order(1, OrderStatus::Processing);
        on_disk.is_printed = false;
        on_disk.is_read = true;

        let cache_by_id = HashMap::from([(1, cached)]);
        let disk_by_id = HashMap::from([(1, on_disk)]);

        let merged = merge_with_local(
            std::iter::once(make_order(1, OrderStatus::Processing)),
            &cache_by_id,
            &disk_by_id,
            Utc::now(),
        );

        // All three flags come from the cache entry, not a mix.
        assert!(merged[0].is_printed);
        assert!(!merged[0].is_read);
    }

    #[test]
    fn merge_falls_back_to_disk_flags() {
        let mut on_disk = make_order(1, OrderStatus::Processing);
        on_disk.is_printed = true;

        let merged = merge_with_local(
            std::iter::once(make_order(1, OrderStatus::Processing)),
            &HashMap::new(),
            &HashMap::from([(1, on_disk)]),
            Utc::now(),
        );

        assert!(merged[0].is_printed);
    }

    #[test]
    fn merge_applies_read_backlog_default_to_unseen_orders() {
        let now = Utc::now();
        let mut old = make_order(1, OrderStatus::Completed);
        old.date_created = now - Duration::days(45);
        let recent = make_order(2, OrderStatus::Processing);

        let merged = merge_with_local(
            vec![old, recent].into_iter(),
            &HashMap::new(),
            &HashMap::new(),
            now,
        );

        assert!(merged[0].is_read);
        assert!(!merged[1].is_read);
    }

    #[test]
    fn merge_does_not_apply_backlog_default_to_known_orders() {
        let now = Utc::now();
        let mut incoming = make_order(1, OrderStatus::Completed);
        incoming.date_created = now - Duration::days(45);
        let prior = make_order(1, OrderStatus::Completed);

        let merged = merge_with_local(
            std::iter::once(incoming),
            &HashMap::new(),
            &HashMap::from([(1, prior)]),
            now,
        );

        // The existing record was unread; old age does not override that.
        assert!(!merged[0].is_read);
    }

    #[test]
    fn filter_by_requested_wildcard_passes_everything() {
        let merged = vec![
            make_order(1, OrderStatus::Processing),
            make_order(2, OrderStatus::Completed),
        ];
        assert_eq!(filter_by_requested(merged.clone(), None).len(), 2);
        assert_eq!(
            filter_by_requested(merged.clone(), Some(OrderStatus::Any)).len(),
            2
        );
        let filtered = filter_by_requested(merged, Some(OrderStatus::Completed));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, 2);
    }
}
