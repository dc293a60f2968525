//! Durable order store backed by SQLite.
//!
//! One table keyed by order id, with remote-owned and locally-owned
//! columns. This is the system of record for the locally-owned flags.
//! Every multi-row write runs inside a single transaction so a crash
//! mid-operation cannot leave a partially-applied refresh behind.

use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::error::SyncError;
use crate::models::Order;
use crate::status::OrderStatus;

/// Durable keyed table of order records.
#[derive(Debug, Clone)]
pub struct OrderStore {
    pool: SqlitePool,
}

impl OrderStore {
    /// Open (or create) a file-backed store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        info!(path = %path.as_ref().display(), "order store opened");
        Ok(store)
    }

    /// Open an in-memory store. A single connection keeps the database
    /// alive for the pool's lifetime.
    pub async fn open_in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS orders (
                id INTEGER PRIMARY KEY,
                number TEXT NOT NULL,
                status TEXT NOT NULL,
                date_created TEXT NOT NULL,
                customer_name TEXT NOT NULL,
                contact_info TEXT NOT NULL,
                billing_address TEXT NOT NULL,
                shipping_address TEXT NOT NULL,
                payment_method TEXT NOT NULL,
                payment_method_title TEXT NOT NULL,
                customer_note TEXT NOT NULL,
                total TEXT NOT NULL,
                subtotal TEXT NOT NULL,
                total_tax TEXT NOT NULL,
                discount_total TEXT NOT NULL,
                line_items TEXT NOT NULL,
                fee_lines TEXT NOT NULL,
                tax_lines TEXT NOT NULL,
                delivery TEXT,
                is_printed INTEGER NOT NULL DEFAULT 0,
                is_read INTEGER NOT NULL DEFAULT 0,
                notification_shown INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_is_read ON orders(is_read)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Insert-or-replace every order by id, in one transaction. Columns
    /// carried by the given records (including flags already resolved by
    /// the merge step) win; nothing else is touched.
    pub async fn upsert_all(&self, orders: &[Order]) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await?;
        for order in orders {
            upsert_order(&mut tx, order).await?;
        }
        tx.commit().await?;
        debug!(count = orders.len(), "orders upserted");
        Ok(())
    }

    /// Replace one status partition: delete every record of `status`, then
    /// upsert the given records. One transaction; records of other
    /// statuses are untouched.
    pub async fn replace_status(
        &self,
        status: OrderStatus,
        orders: &[Order],
    ) -> Result<(), SyncError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM orders WHERE status = ?")
            .bind(status.as_str())
            .execute(&mut *tx)
            .await?;
        for order in orders {
            upsert_order(&mut tx, order).await?;
        }

        tx.commit().await?;
        debug!(status = %status, count = orders.len(), "status partition replaced");
        Ok(())
    }

    /// Reconcile one status partition against a remote fetch: upsert the
    /// given records and delete records of `status` whose id is absent
    /// from them (they have transitioned out of that status). One
    /// transaction. Returns the evicted ids.
    pub async fn reconcile_status(
        &self,
        status: OrderStatus,
        orders: &[Order],
    ) -> Result<Vec<i64>, SyncError> {
        let fetched_ids: std::collections::HashSet<i64> = orders.iter().map(|o| o.id).collect();

        let mut tx = self.pool.begin().await?;

        let existing: Vec<i64> = sqlx::query("SELECT id FROM orders WHERE status = ?")
            .bind(status.as_str())
            .fetch_all(&mut *tx)
            .await?
            .iter()
            .filter_map(|row| row.try_get::<i64, _>("id").ok())
            .collect();

        let stale: Vec<i64> = existing
            .into_iter()
            .filter(|id| !fetched_ids.contains(id))
            .collect();

        for id in &stale {
            sqlx::query("DELETE FROM orders WHERE id = ?")
                .bind(*id)
                .execute(&mut *tx)
                .await?;
        }
        for order in orders {
            upsert_order(&mut tx, order).await?;
        }

        tx.commit().await?;
        debug!(
            status = %status,
            upserted = orders.len(),
            evicted = stale.len(),
            "status partition reconciled"
        );
        Ok(stale)
    }

    /// All orders, newest first.
    pub async fn all(&self) -> Result<Vec<Order>, SyncError> {
        let rows = sqlx::query("SELECT * FROM orders ORDER BY date_created DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_order).collect()
    }

    /// Orders of one status, newest first.
    pub async fn by_status(&self, status: OrderStatus) -> Result<Vec<Order>, SyncError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE status = ? ORDER BY date_created DESC")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_order).collect()
    }

    /// One order by id.
    pub async fn get(&self, id: i64) -> Result<Option<Order>, SyncError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_order).transpose()
    }

    /// Number of unread orders.
    pub async fn unread_count(&self) -> Result<i64, SyncError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE is_read = 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Set the printed flag. Returns false when no record exists.
    pub async fn set_printed(&self, id: i64, printed: bool) -> Result<bool, SyncError> {
        let result = sqlx::query("UPDATE orders SET is_printed = ? WHERE id = ?")
            .bind(printed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Set the read flag. Returns false when no record exists.
    pub async fn set_read(&self, id: i64, read: bool) -> Result<bool, SyncError> {
        let result = sqlx::query("UPDATE orders SET is_read = ? WHERE id = ?")
            .bind(read)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark the arrival notification as shown. One-directional: there is
    /// no way to un-show a notification. Returns false when no record
    /// exists.
    pub async fn set_notification_shown(&self, id: i64) -> Result<bool, SyncError> {
        let result = sqlx::query("UPDATE orders SET notification_shown = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark every order read. Returns the number of rows touched.
    pub async fn mark_all_read(&self) -> Result<u64, SyncError> {
        let result = sqlx::query("UPDATE orders SET is_read = 1 WHERE is_read = 0")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every record.
    pub async fn clear(&self) -> Result<(), SyncError> {
        sqlx::query("DELETE FROM orders").execute(&self.pool).await?;
        info!("order store cleared");
        Ok(())
    }
}

/// Upsert a single order within a transaction.
async fn upsert_order(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    order: &Order,
) -> Result<(), SyncError> {
    let delivery = order
        .delivery
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r"
        INSERT INTO orders (
            id, number, status, date_created, customer_name, contact_info,
            billing_address, shipping_address, payment_method,
            payment_method_title, customer_note, total, subtotal, total_tax,
            discount_total, line_items, fee_lines, tax_lines, delivery,
            is_printed, is_read, notification_shown
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            number = excluded.number,
            status = excluded.status,
            date_created = excluded.date_created,
            customer_name = excluded.customer_name,
            contact_info = excluded.contact_info,
            billing_address = excluded.billing_address,
            shipping_address = excluded.shipping_address,
            payment_method = excluded.payment_method,
            payment_method_title = excluded.payment_method_title,
            customer_note = excluded.customer_note,
            total = excluded.total,
            subtotal = excluded.subtotal,
            total_tax = excluded.total_tax,
            discount_total = excluded.discount_total,
            line_items = excluded.line_items,
            fee_lines = excluded.fee_lines,
            tax_lines = excluded.tax_lines,
            delivery = excluded.delivery,
            is_printed = excluded.is_printed,
            is_read = excluded.is_read,
            notification_shown = excluded.notification_shown
        ",
    )
    .bind(order.id)
    .bind(&order.number)
    .bind(order.status.as_str())
    .bind(order.date_created)
    .bind(&order.customer_name)
    .bind(&order.contact_info)
    .bind(&order.billing_address)
    .bind(&order.shipping_address)
    .bind(&order.payment_method)
    .bind(&order.payment_method_title)
    .bind(&order.customer_note)
    .bind(order.total.to_string())
    .bind(order.subtotal.to_string())
    .bind(order.total_tax.to_string())
    .bind(order.discount_total.to_string())
    .bind(serde_json::to_string(&order.line_items)?)
    .bind(serde_json::to_string(&order.fee_lines)?)
    .bind(serde_json::to_string(&order.tax_lines)?)
    .bind(delivery)
    .bind(order.is_printed)
    .bind(order.is_read)
    .bind(order.notification_shown)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Decode a database row into an [`Order`].
fn row_to_order(row: &SqliteRow) -> Result<Order, SyncError> {
    let status: String = row.try_get("status")?;
    let date_created: DateTime<Utc> = row.try_get("date_created")?;
    let delivery: Option<String> = row.try_get("delivery")?;

    Ok(Order {
        id: row.try_get("id")?,
        number: row.try_get("number")?,
        status: OrderStatus::normalize(&status),
        date_created,
        customer_name: row.try_get("customer_name")?,
        contact_info: row.try_get("contact_info")?,
        billing_address: row.try_get("billing_address")?,
        shipping_address: row.try_get("shipping_address")?,
        payment_method: row.try_get("payment_method")?,
        payment_method_title: row.try_get("payment_method_title")?,
        customer_note: row.try_get("customer_note")?,
        total: decimal_column(row, "total")?,
        subtotal: decimal_column(row, "subtotal")?,
        total_tax: decimal_column(row, "total_tax")?,
        discount_total: decimal_column(row, "discount_total")?,
        line_items: json_column(row, "line_items")?,
        fee_lines: json_column(row, "fee_lines")?,
        tax_lines: json_column(row, "tax_lines")?,
        delivery: delivery
            .map(|raw| serde_json::from_str(&raw))
            .transpose()?,
        is_printed: row.try_get("is_printed")?,
        is_read: row.try_get("is_read")?,
        notification_shown: row.try_get("notification_shown")?,
    })
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Decimal, SyncError> {
    let raw: String = row.try_get(column)?;
    Ok(raw.parse().unwrap_or(Decimal::ZERO))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &SqliteRow,
    column: &str,
) -> Result<T, SyncError> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}
