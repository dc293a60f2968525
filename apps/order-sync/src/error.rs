//! Error types for the sync engine.
//!
//! All public operations return `Result<_, SyncError>`. Expected failure
//! conditions (missing configuration, network faults, rejected parameters)
//! are values, never panics.

use thiserror::Error;

/// Errors surfaced by the sync engine and its collaborators.
#[derive(Debug, Error, Clone)]
pub enum SyncError {
    /// Remote configuration is missing or invalid. Fatal for the current
    /// operation; never retried automatically.
    #[error("remote configuration invalid: {0}")]
    ConfigInvalid(String),

    /// The remote API rejected the credentials.
    #[error("remote API rejected credentials")]
    Unauthorized,

    /// The remote API rejected a request parameter (e.g. a status value it
    /// does not recognize).
    #[error("invalid request parameter: {0}")]
    InvalidParameter(String),

    /// Transport-level failure (connect, timeout, non-2xx without a usable
    /// error body). Transient; the caller decides whether to retry.
    #[error("network error: {0}")]
    Network(String),

    /// The remote payload could not be decoded at the page level.
    /// Individual malformed records are skipped, not surfaced.
    #[error("payload parse error: {0}")]
    Parse(String),

    /// Local store read or write failure. Always surfaced: a swallowed
    /// write failure desynchronizes cache and disk.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Whether the failure is transient and worth retrying by the caller.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
