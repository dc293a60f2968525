//! Engine and daemon configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;
use crate::status::OrderStatus;

/// Default records requested per remote page.
pub const DEFAULT_PER_PAGE: u32 = 100;

/// Default HTTP request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default background poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the remote order API.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Store base URL (e.g. `https://shop.example.com`).
    pub base_url: String,
    /// API consumer key.
    pub consumer_key: String,
    /// API consumer secret.
    pub consumer_secret: String,
    /// Records per page; the engine requires at least 100.
    pub per_page: u32,
    /// HTTP request timeout.
    pub timeout: Duration,
}

impl RemoteConfig {
    /// Create a configuration with default page size and timeout.
    #[must_use]
    pub fn new(
        base_url: impl Into<String>,
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            per_page: DEFAULT_PER_PAGE,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the page size.
    #[must_use]
    pub const fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Set the HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// Every engine operation that reaches for the network calls this
    /// first and fails fast with [`SyncError::ConfigInvalid`].
    pub fn validate(&self) -> Result<(), SyncError> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(SyncError::ConfigInvalid("base URL is empty".to_string()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SyncError::ConfigInvalid(format!(
                "base URL '{url}' is not an http(s) URL"
            )));
        }
        if self.consumer_key.trim().is_empty() || self.consumer_secret.trim().is_empty() {
            return Err(SyncError::ConfigInvalid(
                "consumer key/secret are not set".to_string(),
            ));
        }
        if self.per_page == 0 {
            return Err(SyncError::ConfigInvalid("per_page must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Configuration for the background poll driver.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// The single status the driver tracks (the "active" status).
    pub status: OrderStatus,
    /// Poll cadence. Polls never overlap regardless of cadence.
    pub interval: Duration,
    /// Capacity of the arrivals channel.
    pub arrivals_buffer: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            status: OrderStatus::Processing,
            interval: DEFAULT_POLL_INTERVAL,
            arrivals_buffer: 16,
        }
    }
}

impl PollConfig {
    /// Set the tracked status.
    #[must_use]
    pub const fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the poll cadence.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Daemon configuration file (`order-syncd.yaml`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Remote API settings.
    pub remote: RemoteSection,
    /// Path to the SQLite database file.
    pub database: String,
    /// Background poll settings.
    #[serde(default)]
    pub poll: PollSection,
}

/// `remote:` section of the daemon config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    /// Store base URL.
    pub base_url: String,
    /// API consumer key. May be overridden by `ORDER_SYNC_KEY`.
    #[serde(default)]
    pub consumer_key: String,
    /// API consumer secret. May be overridden by `ORDER_SYNC_SECRET`.
    #[serde(default)]
    pub consumer_secret: String,
    /// Records per page.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// `poll:` section of the daemon config file.
#[derive(Debug, Clone, Deserialize)]
pub struct PollSection {
    /// Tracked status token (normalized on load).
    #[serde(default = "default_poll_status")]
    pub status: String,
    /// Poll cadence in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: u64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            status: default_poll_status(),
            interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_poll_status() -> String {
    OrderStatus::Processing.as_str().to_string()
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL.as_secs()
}

impl AppConfig {
    /// Build the engine-facing remote configuration.
    #[must_use]
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig::new(
            self.remote.base_url.clone(),
            self.remote.consumer_key.clone(),
            self.remote.consumer_secret.clone(),
        )
        .with_per_page(self.remote.per_page)
        .with_timeout(Duration::from_secs(self.remote.timeout_secs))
    }

    /// Build the poll driver configuration.
    #[must_use]
    pub fn poll_config(&self) -> PollConfig {
        PollConfig::default()
            .with_status(OrderStatus::normalize(&self.poll.status))
            .with_interval(Duration::from_secs(self.poll.interval_secs))
    }
}
