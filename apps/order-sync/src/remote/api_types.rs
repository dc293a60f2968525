//! Wire types for the remote order API.
//!
//! These map directly to the REST payload. Monetary values arrive as
//! strings (and occasionally bare numbers); everything carries defaults so
//! a sparse record still decodes, and conversion to the domain model is
//! where lenient parsing happens.

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::delivery::parse_delivery_info;
use crate::models::{FeeLine, LineItem, Order, TaxLine};
use crate::status::OrderStatus;

/// Error body returned by the remote API on 4xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    /// Machine error code, e.g. `rest_invalid_param`.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

/// An order record as returned by the list endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDto {
    /// Stable remote identifier.
    pub id: i64,
    /// Human display number.
    #[serde(default)]
    pub number: String,
    /// Status token; canonical or localized, normalized on conversion.
    #[serde(default)]
    pub status: String,
    /// Creation timestamp, `YYYY-MM-DDTHH:MM:SS` in store-local time.
    #[serde(default)]
    pub date_created: String,
    /// Order total.
    #[serde(default)]
    pub total: String,
    /// Total tax.
    #[serde(default)]
    pub total_tax: String,
    /// Total discount.
    #[serde(default)]
    pub discount_total: String,
    /// Goods subtotal, if the server reports one.
    #[serde(default)]
    pub subtotal: String,
    /// Customer record, when the store exposes one.
    #[serde(default)]
    pub customer: Option<CustomerDto>,
    /// Billing address.
    #[serde(default)]
    pub billing: AddressDto,
    /// Shipping address; empty object for pickup orders.
    #[serde(default)]
    pub shipping: AddressDto,
    /// Payment method code.
    #[serde(default)]
    pub payment_method: String,
    /// Payment method display title.
    #[serde(default)]
    pub payment_method_title: String,
    /// Free-text customer note.
    #[serde(default)]
    pub customer_note: String,
    /// Product lines.
    #[serde(default)]
    pub line_items: Vec<LineItemDto>,
    /// Fee lines.
    #[serde(default)]
    pub fee_lines: Vec<FeeLineDto>,
    /// Tax lines.
    #[serde(default)]
    pub tax_lines: Vec<TaxLineDto>,
}

/// Customer sub-record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDto {
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// Email address.
    #[serde(default)]
    pub email: String,
    /// Phone number.
    #[serde(default)]
    pub phone: String,
}

/// Billing or shipping address sub-record.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressDto {
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Last name.
    #[serde(default)]
    pub last_name: String,
    /// Street address.
    #[serde(default)]
    pub address_1: String,
    /// City.
    #[serde(default)]
    pub city: String,
    /// State or province.
    #[serde(default)]
    pub state: String,
    /// Postal code.
    #[serde(default)]
    pub postcode: String,
    /// Phone number.
    #[serde(default)]
    pub phone: String,
    /// Email address (billing only).
    #[serde(default)]
    pub email: String,
}

/// Product line sub-record.
#[derive(Debug, Clone, Deserialize)]
pub struct LineItemDto {
    /// Product identifier.
    #[serde(default)]
    pub product_id: i64,
    /// Product name.
    #[serde(default)]
    pub name: String,
    /// Quantity.
    #[serde(default)]
    pub quantity: i64,
    /// Unit price; the API sends this as a bare number.
    #[serde(default)]
    pub price: Value,
    /// Line subtotal.
    #[serde(default)]
    pub subtotal: String,
    /// Line total.
    #[serde(default)]
    pub total: String,
}

/// Fee line sub-record.
#[derive(Debug, Clone, Deserialize)]
pub struct FeeLineDto {
    /// Fee line identifier.
    #[serde(default)]
    pub id: i64,
    /// Fee name.
    #[serde(default)]
    pub name: String,
    /// Fee amount.
    #[serde(default)]
    pub total: String,
    /// Tax on the fee.
    #[serde(default)]
    pub total_tax: String,
}

/// Tax line sub-record.
#[derive(Debug, Clone, Deserialize)]
pub struct TaxLineDto {
    /// Tax line identifier.
    #[serde(default)]
    pub id: i64,
    /// Tax label.
    #[serde(default)]
    pub label: String,
    /// Rate as a percentage.
    #[serde(default)]
    pub rate_percent: Value,
    /// Tax amount.
    #[serde(default)]
    pub tax_total: String,
}

impl OrderDto {
    /// Convert to the domain model.
    ///
    /// Locally-owned flags start out false; the engine's merge step adopts
    /// them from any existing record afterwards.
    #[must_use]
    pub fn to_order(&self) -> Order {
        let line_items: Vec<LineItem> = self
            .line_items
            .iter()
            .map(|li| LineItem {
                product_id: li.product_id,
                name: li.name.clone(),
                quantity: li.quantity,
                price: value_to_decimal(&li.price),
                subtotal: parse_money(&li.subtotal),
                total: parse_money(&li.total),
            })
            .collect();

        let total = parse_money(&self.total);
        let total_tax = parse_money(&self.total_tax);
        let subtotal = self.derive_subtotal(&line_items, total, total_tax);

        let shipping_address = self.shipping.formatted();
        let delivery = parse_delivery_info(
            &self.customer_note,
            &shipping_address,
            &self.payment_method_title,
        );

        Order {
            id: self.id,
            number: self.number.clone(),
            status: OrderStatus::normalize(&self.status),
            date_created: parse_timestamp(&self.date_created),
            customer_name: self.customer_name(),
            contact_info: self.contact_info(),
            billing_address: self.billing.formatted(),
            shipping_address,
            payment_method: self.payment_method.clone(),
            payment_method_title: self.payment_method_title.clone(),
            customer_note: self.customer_note.clone(),
            total,
            subtotal,
            total_tax,
            discount_total: parse_money(&self.discount_total),
            line_items,
            fee_lines: self
                .fee_lines
                .iter()
                .map(|fl| FeeLine {
                    id: fl.id,
                    name: fl.name.clone(),
                    total: parse_money(&fl.total),
                    total_tax: parse_money(&fl.total_tax),
                })
                .collect(),
            tax_lines: self
                .tax_lines
                .iter()
                .map(|tl| TaxLine {
                    id: tl.id,
                    label: tl.label.clone(),
                    rate_percent: value_to_decimal(&tl.rate_percent),
                    tax_total: parse_money(&tl.tax_total),
                })
                .collect(),
            is_printed: false,
            is_read: false,
            notification_shown: false,
            delivery,
        }
    }

    /// Customer display name: the customer record, then the billing
    /// address, then a guest placeholder.
    fn customer_name(&self) -> String {
        let from_customer = self
            .customer
            .as_ref()
            .map(|c| join_names(&c.first_name, &c.last_name))
            .unwrap_or_default();
        if !from_customer.is_empty() {
            return from_customer;
        }

        let from_billing = join_names(&self.billing.first_name, &self.billing.last_name);
        if from_billing.is_empty() {
            "Guest".to_string()
        } else {
            from_billing
        }
    }

    /// Preferred contact: customer phone, customer email, billing phone,
    /// billing email.
    fn contact_info(&self) -> String {
        if let Some(customer) = &self.customer {
            if !customer.phone.is_empty() {
                return customer.phone.clone();
            }
            if !customer.email.is_empty() {
                return customer.email.clone();
            }
        }
        if !self.billing.phone.is_empty() {
            return self.billing.phone.clone();
        }
        self.billing.email.clone()
    }

    /// Goods subtotal: the server's value when present, else the sum of
    /// line subtotals, else total minus tax.
    fn derive_subtotal(&self, line_items: &[LineItem], total: Decimal, total_tax: Decimal) -> Decimal {
        let reported = parse_money(&self.subtotal);
        if reported > Decimal::ZERO {
            return reported;
        }
        let from_lines: Decimal = line_items.iter().map(|li| li.subtotal).sum();
        if from_lines > Decimal::ZERO {
            return from_lines;
        }
        total - total_tax
    }
}

impl AddressDto {
    /// Comma-joined non-empty address components.
    fn formatted(&self) -> String {
        [&self.address_1, &self.city, &self.state, &self.postcode]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Parse a money string, treating anything unparsable as zero.
fn parse_money(raw: &str) -> Decimal {
    raw.trim().parse().unwrap_or(Decimal::ZERO)
}

/// Parse a JSON value that is sometimes a number and sometimes a string.
fn value_to_decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => parse_money(s),
        Value::Number(n) => n
            .to_string()
            .parse()
            .unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    }
}

/// Parse the API's store-local timestamp, tolerating RFC 3339 variants.
/// Falls back to the current time for garbage input.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    warn!(raw = %raw, "unparsable order timestamp, substituting now");
    Utc::now()
}

fn join_names(first: &str, last: &str) -> String {
    [first, last]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> serde_json::Value {
        serde_json::json!({
            "id": 42,
            "number": "1042",
            "status": "processing",
            "date_created": "2026-08-01T12:30:00",
            "total": "25.50",
            "total_tax": "2.50",
            "discount_total": "0.00",
            "billing": {
                "first_name": "Grace",
                "last_name": "Hopper",
                "address_1": "1 Navy Way",
                "city": "Arlington",
                "state": "VA",
                "postcode": "22202",
                "phone": "555-0100",
                "email": "grace@example.com"
            },
            "shipping": {},
            "payment_method": "cod",
            "payment_method_title": "Cash on delivery",
            "customer_note": "pickup at 18:30",
            "line_items": [
                {
                    "product_id": 7,
                    "name": "Dumplings",
                    "quantity": 2,
                    "price": 10.0,
                    "subtotal": "20.00",
                    "total": "20.00"
                },
                {
                    "product_id": 9,
                    "name": "Tea",
                    "quantity": 1,
                    "price": 3.0,
                    "subtotal": "3.00",
                    "total": "3.00"
                }
            ],
            "fee_lines": [
                {"id": 1, "name": "Packaging", "total": "1.00", "total_tax": "0.00"}
            ],
            "tax_lines": [
                {"id": 2, "label": "GST", "rate_percent": 5.0, "tax_total": "2.50"}
            ]
        })
    }

    #[test]
    fn decodes_and_converts() {
        let dto: OrderDto = serde_json::from_value(sample_json()).unwrap();
        let order = dto.to_order();

        assert_eq!(order.id, 42);
        assert_eq!(order.number, "1042");
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.customer_name, "Grace Hopper");
        assert_eq!(order.contact_info, "555-0100");
        assert_eq!(order.total, Decimal::new(2550, 2));
        assert_eq!(order.line_items.len(), 2);
        assert_eq!(order.line_items[0].price, Decimal::new(100, 1));
        assert_eq!(order.tax_lines[0].rate_percent, Decimal::new(50, 1));
        assert!(!order.is_printed);
        assert!(!order.is_read);
        assert!(!order.notification_shown);
    }

    #[test]
    fn localized_status_normalizes() {
        let mut json = sample_json();
        json["status"] = serde_json::json!("处理中");
        let dto: OrderDto = serde_json::from_value(json).unwrap();
        assert_eq!(dto.to_order().status, OrderStatus::Processing);
    }

    #[test]
    fn missing_names_fall_back_to_guest() {
        let mut json = sample_json();
        json["billing"] = serde_json::json!({});
        let dto: OrderDto = serde_json::from_value(json).unwrap();
        assert_eq!(dto.to_order().customer_name, "Guest");
    }

    #[test]
    fn subtotal_derives_from_line_items_when_missing() {
        let dto: OrderDto = serde_json::from_value(sample_json()).unwrap();
        // No top-level subtotal in the sample: 20.00 + 3.00.
        assert_eq!(dto.to_order().subtotal, Decimal::new(2300, 2));
    }

    #[test]
    fn subtotal_falls_back_to_total_minus_tax() {
        let mut json = sample_json();
        json["line_items"] = serde_json::json!([]);
        let dto: OrderDto = serde_json::from_value(json).unwrap();
        assert_eq!(dto.to_order().subtotal, Decimal::new(2300, 2));
    }

    #[test]
    fn pickup_note_yields_pickup_delivery_info() {
        let dto: OrderDto = serde_json::from_value(sample_json()).unwrap();
        let delivery = dto.to_order().delivery.unwrap();
        assert!(!delivery.is_delivery);
        assert_eq!(delivery.scheduled_time.as_deref(), Some("18:30"));
    }

    #[test]
    fn timestamp_variants_parse() {
        let local = parse_timestamp("2026-08-01T12:30:00");
        assert_eq!(local.to_rfc3339(), "2026-08-01T12:30:00+00:00");

        let rfc = parse_timestamp("2026-08-01T12:30:00Z");
        assert_eq!(rfc, local);
    }

    #[test]
    fn sparse_record_still_decodes() {
        let dto: OrderDto = serde_json::from_value(serde_json::json!({"id": 1})).unwrap();
        let order = dto.to_order();
        assert_eq!(order.id, 1);
        assert_eq!(order.status, OrderStatus::Any);
        assert_eq!(order.total, Decimal::ZERO);
    }
}
