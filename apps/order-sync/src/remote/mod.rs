//! Remote order API client and wire types.

mod api_types;
mod client;

pub use api_types::{ErrorBody, OrderDto};
pub use client::OrdersClient;
