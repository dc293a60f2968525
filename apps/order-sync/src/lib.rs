// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::too_many_lines,
        clippy::default_trait_access
    )
)]

//! Order Sync - order mirroring engine
//!
//! Mirrors orders from a remote WooCommerce-style order-management API into
//! a local SQLite store so consumers can render instantly and keep working
//! offline. The hard part lives here: the synchronization and
//! cache-reconciliation engine that merges remote snapshots into local
//! storage while preserving locally-owned flags, with a UI-silent
//! background polling path for arrival detection.
//!
//! # Components (leaf first)
//!
//! - [`status`]: canonical status codes and the normalizer that resolves
//!   localized or misspelled tokens
//! - [`store`]: the durable SQLite table of order records, the system of
//!   record for locally-owned flags
//! - [`cache`]: copy-on-write snapshot of the last-known list with
//!   push-based subscriptions
//! - [`remote`]: the paged list-orders HTTP client
//! - [`engine`]: the reconciliation engine tying the above together, plus
//!   the local flag mutators
//! - [`poll`]: the recurring silent-poll driver with arrival detection
//! - [`delivery`]: pure heuristic extraction of delivery metadata from
//!   order notes (advisory only)

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod models;
pub mod poll;
pub mod remote;
pub mod status;
pub mod store;

pub use cache::OrderCache;
pub use config::{AppConfig, PollConfig, RemoteConfig};
pub use delivery::parse_delivery_info;
pub use engine::SyncEngine;
pub use error::SyncError;
pub use models::{DeliveryInfo, FeeLine, LineItem, Order, TaxLine};
pub use poll::PollDriver;
pub use remote::OrdersClient;
pub use status::OrderStatus;
pub use store::OrderStore;
