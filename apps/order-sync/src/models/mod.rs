//! Domain model for mirrored orders.

mod order;

pub use order::{DeliveryInfo, FeeLine, LineItem, Order, READ_BACKLOG_DAYS, TaxLine};
