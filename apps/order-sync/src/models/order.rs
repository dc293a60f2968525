//! The `Order` aggregate and its value objects.
//!
//! Remote-owned fields are replaced wholesale on every successful refresh.
//! The three locally-owned flags (`is_printed`, `is_read`,
//! `notification_shown`) are owned by this device: remote data never sets
//! them, and every merge path carries them forward from the prior record.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::status::OrderStatus;

/// Orders older than this many days with no prior local record are created
/// already-read, so a first sync does not flood unread indicators with
/// historical backlog.
pub const READ_BACKLOG_DAYS: i64 = 30;

/// A single product line on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Remote product identifier.
    pub product_id: i64,
    /// Product display name.
    pub name: String,
    /// Ordered quantity.
    pub quantity: i64,
    /// Unit price.
    pub price: Decimal,
    /// Line subtotal before discounts.
    pub subtotal: Decimal,
    /// Line total after discounts.
    pub total: Decimal,
}

/// An extra fee line (e.g. service or packaging fee).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeLine {
    /// Remote fee line identifier.
    pub id: i64,
    /// Fee display name.
    pub name: String,
    /// Fee amount.
    pub total: Decimal,
    /// Tax charged on the fee.
    pub total_tax: Decimal,
}

/// A tax line with its rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    /// Remote tax line identifier.
    pub id: i64,
    /// Tax label (e.g. "GST").
    pub label: String,
    /// Rate as a percentage.
    pub rate_percent: Decimal,
    /// Tax amount for this line.
    pub tax_total: Decimal,
}

/// Delivery/pickup metadata heuristically extracted from order notes.
///
/// Best-effort and non-authoritative: recomputed from remote-owned fields
/// on every refresh, never merged, and never part of the engine's
/// correctness contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryInfo {
    /// Whether this looks like a delivery order (vs. pickup).
    pub is_delivery: bool,
    /// Requested time as written in the note, if any.
    pub scheduled_time: Option<String>,
    /// Delivery address, for delivery orders.
    pub address: Option<String>,
    /// Delivery fee extracted from the note.
    pub delivery_fee: Option<Decimal>,
    /// Tip amount extracted from the note.
    pub tip: Option<Decimal>,
}

/// A mirrored order. Exactly one record exists per `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Stable remote identifier. Immutable, primary key.
    pub id: i64,
    /// Human display identifier.
    pub number: String,
    /// Canonical status code. Never a raw remote string.
    pub status: OrderStatus,
    /// Creation timestamp (remote-owned).
    pub date_created: DateTime<Utc>,
    /// Customer display name.
    pub customer_name: String,
    /// Phone or email, whichever the customer provided.
    pub contact_info: String,
    /// Formatted billing address.
    pub billing_address: String,
    /// Shipping address, empty for pickup orders.
    pub shipping_address: String,
    /// Payment method code.
    pub payment_method: String,
    /// Payment method display title.
    pub payment_method_title: String,
    /// Free-text customer note.
    pub customer_note: String,
    /// Order total.
    pub total: Decimal,
    /// Goods subtotal.
    pub subtotal: Decimal,
    /// Total tax.
    pub total_tax: Decimal,
    /// Total discount.
    pub discount_total: Decimal,
    /// Product lines.
    pub line_items: Vec<LineItem>,
    /// Fee lines.
    pub fee_lines: Vec<FeeLine>,
    /// Tax lines.
    pub tax_lines: Vec<TaxLine>,
    /// Locally-owned: the order has been printed on this device.
    pub is_printed: bool,
    /// Locally-owned: the order has been seen by the operator.
    pub is_read: bool,
    /// Locally-owned: an arrival notification was already shown.
    pub notification_shown: bool,
    /// Heuristically parsed delivery metadata.
    pub delivery: Option<DeliveryInfo>,
}

impl Order {
    /// Copy the locally-owned flags from a prior record onto this one.
    ///
    /// Called on every incoming remote record that has an existing local
    /// counterpart: the local flags always win over whatever the remote
    /// payload carried (it has no concept of them).
    pub fn adopt_local_flags(&mut self, prior: &Self) {
        self.is_printed = prior.is_printed;
        self.is_read = prior.is_read;
        self.notification_shown = prior.notification_shown;
    }

    /// Apply the read-state default for orders with no prior local record:
    /// anything older than [`READ_BACKLOG_DAYS`] starts out read.
    pub fn apply_read_backlog_default(&mut self, now: DateTime<Utc>) {
        if self.date_created < now - Duration::days(READ_BACKLOG_DAYS) {
            self.is_read = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_order(id: i64, status: OrderStatus) -> Order {
        Order {
            id,
            number: id.to_string(),
            status,
            date_created: Utc::now(),
            customer_name: "Ada Lovelace".to_string(),
            contact_info: "ada@example.com".to_string(),
            billing_address: "1 Analytical Way".to_string(),
            shipping_address: String::new(),
            payment_method: "cod".to_string(),
            payment_method_title: "Cash on delivery".to_string(),
            customer_note: String::new(),
            total: Decimal::new(1999, 2),
            subtotal: Decimal::new(1799, 2),
            total_tax: Decimal::new(200, 2),
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
    fn adopt_local_flags_copies_all_three() {
        let mut incoming = make_order(42, OrderStatus::Processing);
        let mut prior = make_order(42, OrderStatus::Pending);
        prior.is_printed = true;
        prior.is_read = true;
        prior.notification_shown = true;

        incoming.adopt_local_flags(&prior);

        assert!(incoming.is_printed);
        assert!(incoming.is_read);
        assert!(incoming.notification_shown);
        // Remote-owned fields are untouched by flag adoption.
        assert_eq!(incoming.status, OrderStatus::Processing);
    }

    #[test]
    fn read_backlog_default_marks_old_orders_read() {
        let now = Utc::now();
        let mut old = make_order(1, OrderStatus::Completed);
        old.date_created = now - Duration::days(READ_BACKLOG_DAYS + 1);
        old.apply_read_backlog_default(now);
        assert!(old.is_read);
    }

    #[test]
    fn read_backlog_default_leaves_recent_orders_unread() {
        let now = Utc::now();
        let mut recent = make_order(2, OrderStatus::Processing);
        recent.date_created = now - Duration::days(READ_BACKLOG_DAYS - 1);
        recent.apply_read_backlog_default(now);
        assert!(!recent.is_read);
    }

    #[test]
    fn order_serde_round_trip() {
        let order = make_order(7, OrderStatus::OnHold);
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
