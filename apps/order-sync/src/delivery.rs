//! Heuristic extraction of delivery metadata from order notes.
//!
//! Stores encode delivery time, fees and tips as free text in the customer
//! note, in a mix of English and Chinese. This module is a pure function
//! over remote-owned fields: no I/O, no engine state, and a failed parse is
//! `None`, never an error. The result is advisory display data only.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::models::DeliveryInfo;

static FEE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(外卖费|配送费|运费|送餐费|shipping fee|delivery fee|delivery charge)[:：]?\s*([¥￥$]?\s*\d+(\.\d+)?)",
    )
    .unwrap()
});

static TIP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(小费|感谢费|tip|gratuity|show your appreciation)[:：]?\s*([¥￥$]?\s*\d+(\.\d+)?)")
        .unwrap()
});

// 24-hour or 12-hour clock time.
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2}:\d{2}(\s*[AaPp][Mm])?)").unwrap()
});

// Chinese clock time, e.g. 下午3点30分.
static TIME_ZH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([上下]午\s*\d{1,2}\s*[点时]\s*(\d{1,2}\s*分钟?)?)").unwrap()
});

static PICKUP_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)自取|pickup").unwrap());

/// Parse delivery/pickup metadata from an order's free-text fields.
///
/// Returns `None` when nothing suggests either a delivery or a pickup
/// order. A non-empty shipping address classifies the order as delivery;
/// otherwise pickup keywords in the note or payment method title classify
/// it as pickup.
#[must_use]
pub fn parse_delivery_info(
    note: &str,
    shipping_address: &str,
    payment_method_title: &str,
) -> Option<DeliveryInfo> {
    let is_delivery = !shipping_address.trim().is_empty();

    if !is_delivery {
        let is_pickup = PICKUP_RE.is_match(note) || PICKUP_RE.is_match(payment_method_title);
        if !is_pickup {
            return None;
        }
    }

    Some(DeliveryInfo {
        is_delivery,
        scheduled_time: extract_time(note),
        address: is_delivery.then(|| shipping_address.trim().to_string()),
        delivery_fee: extract_amount(&FEE_RE, note),
        tip: extract_amount(&TIP_RE, note),
    })
}

/// Extract a scheduled time from the note, trying clock formats first and
/// Chinese phrasing second.
fn extract_time(note: &str) -> Option<String> {
    if let Some(caps) = TIME_RE.captures(note) {
        return Some(caps[1].to_string());
    }
    TIME_ZH_RE
        .captures(note)
        .map(|caps| caps[1].trim().to_string())
}

/// Extract a labeled money amount, stripping currency symbols and spaces.
fn extract_amount(re: &Regex, note: &str) -> Option<Decimal> {
    let caps = re.captures(note)?;
    let raw: String = caps[2]
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Decimal::from_str(&raw).ok()
}
