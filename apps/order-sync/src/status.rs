//! Canonical order status and the status normalizer.
//!
//! The remote API speaks a small canonical vocabulary, but callers (and the
//! remote itself, depending on store locale) may hand us localized display
//! names. Everything above this module works on [`OrderStatus`]; raw string
//! comparison against a status is never correct anywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Canonical order status codes, plus the `any` wildcard sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    /// Awaiting payment.
    Pending,
    /// Paid, being prepared.
    Processing,
    /// Held pending manual review.
    OnHold,
    /// Fulfilled.
    Completed,
    /// Cancelled by customer or merchant.
    Cancelled,
    /// Refunded after completion.
    Refunded,
    /// Payment failed.
    Failed,
    /// Soft-deleted on the remote.
    Trash,
    /// Wildcard: matches every status. Also the sink for tokens the
    /// normalizer cannot resolve, since the remote vocabulary can be
    /// extended by server-side configuration.
    Any,
}

/// Localized display name ↔ canonical code pairs.
///
/// Seeded with the zh-CN vocabulary the order UI ships with. Lookups go in
/// both directions: a localized token resolves to its code, and a code
/// resolves to its display name for membership checks.
const SYNONYMS: &[(&str, OrderStatus)] = &[
    ("处理中", OrderStatus::Processing),
    ("待付款", OrderStatus::Pending),
    ("暂挂", OrderStatus::OnHold),
    ("已完成", OrderStatus::Completed),
    ("已取消", OrderStatus::Cancelled),
    ("已退款", OrderStatus::Refunded),
    ("失败", OrderStatus::Failed),
];

impl OrderStatus {
    /// All canonical statuses the remote API accepts as a filter value.
    pub const ALL: &'static [Self] = &[
        Self::Pending,
        Self::Processing,
        Self::OnHold,
        Self::Completed,
        Self::Cancelled,
        Self::Refunded,
        Self::Failed,
        Self::Trash,
        Self::Any,
    ];

    /// The canonical code for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::OnHold => "on-hold",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
            Self::Trash => "trash",
            Self::Any => "any",
        }
    }

    /// The localized display name, if the synonym table carries one.
    #[must_use]
    pub fn display_name(&self) -> Option<&'static str> {
        SYNONYMS
            .iter()
            .find(|(_, status)| status == self)
            .map(|(name, _)| *name)
    }

    /// Resolve any accepted status token to a canonical status.
    ///
    /// Lookup order: trimmed + lowercased canonical code, then the synonym
    /// table. Unresolvable tokens degrade to [`OrderStatus::Any`] with a
    /// diagnostic; an unmapped status is never an error because the remote
    /// vocabulary may grow underneath us.
    #[must_use]
    pub fn normalize(input: &str) -> Self {
        let token = input.trim().to_lowercase();

        for status in Self::ALL {
            if status.as_str() == token {
                return *status;
            }
        }

        // Localized names are matched on the trimmed original: lowercasing
        // is a no-op for them, but leading/trailing whitespace is not.
        let trimmed = input.trim();
        for (name, status) in SYNONYMS {
            if *name == trimmed {
                return *status;
            }
        }

        warn!(token = %input, "unmapped status token, falling back to wildcard");
        Self::Any
    }

    /// Whether this order's status satisfies a requested status token.
    ///
    /// Accepts a direct canonical match and a match through the synonym
    /// table in either direction. The wildcard on the requested side
    /// matches everything.
    #[must_use]
    pub fn matches(&self, requested: &str) -> bool {
        match Self::normalize(requested) {
            Self::Any => true,
            status => status == *self,
        }
    }

    /// Whether this is the wildcard sentinel.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::normalize(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_canonical_codes() {
        assert_eq!(OrderStatus::normalize("processing"), OrderStatus::Processing);
        assert_eq!(OrderStatus::normalize("on-hold"), OrderStatus::OnHold);
        assert_eq!(OrderStatus::normalize("any"), OrderStatus::Any);
    }

    #[test]
    fn normalize_is_case_and_whitespace_insensitive() {
        assert_eq!(OrderStatus::normalize(" Processing "), OrderStatus::Processing);
        assert_eq!(OrderStatus::normalize("COMPLETED"), OrderStatus::Completed);
    }

    #[test]
    fn normalize_localized_names() {
        assert_eq!(OrderStatus::normalize("处理中"), OrderStatus::Processing);
        assert_eq!(OrderStatus::normalize("待付款"), OrderStatus::Pending);
        assert_eq!(OrderStatus::normalize(" 已完成 "), OrderStatus::Completed);
        assert_eq!(OrderStatus::normalize("暂挂"), OrderStatus::OnHold);
    }

    #[test]
    fn normalize_unknown_falls_back_to_wildcard() {
        assert_eq!(OrderStatus::normalize("checkout-draft-v2"), OrderStatus::Any);
        assert_eq!(OrderStatus::normalize(""), OrderStatus::Any);
    }

    #[test]
    fn matches_direct_and_via_synonyms() {
        assert!(OrderStatus::Processing.matches("processing"));
        assert!(OrderStatus::Processing.matches("处理中"));
        assert!(OrderStatus::Processing.matches(" PROCESSING "));
        assert!(!OrderStatus::Processing.matches("completed"));
        assert!(!OrderStatus::Processing.matches("已完成"));
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(OrderStatus::Completed.matches("any"));
        assert!(OrderStatus::Failed.matches("some-future-status"));
    }

    #[test]
    fn display_names_round_trip() {
        for (name, status) in SYNONYMS {
            assert_eq!(status.display_name(), Some(*name));
            assert_eq!(OrderStatus::normalize(name), *status);
        }
        assert_eq!(OrderStatus::Trash.display_name(), None);
    }

    #[test]
    fn status_serde_uses_canonical_codes() {
        let json = serde_json::to_string(&OrderStatus::OnHold).unwrap();
        assert_eq!(json, "\"on-hold\"");

        let parsed: OrderStatus = serde_json::from_str("\"refunded\"").unwrap();
        assert_eq!(parsed, OrderStatus::Refunded);
    }

    #[test]
    fn from_str_never_fails() {
        let status: OrderStatus = "nonsense".parse().unwrap();
        assert_eq!(status, OrderStatus::Any);
    }
}
