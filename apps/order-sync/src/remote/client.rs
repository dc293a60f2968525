//! HTTP client for the remote order API.

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::api_types::{ErrorBody, OrderDto};
use crate::config::RemoteConfig;
use crate::error::SyncError;
use crate::status::OrderStatus;

/// Hard ceiling on pages fetched per listing, as a runaway guard against a
/// server that keeps returning full pages.
const MAX_PAGES: u32 = 50;

/// Client for the paged list-orders endpoint.
#[derive(Debug, Clone)]
pub struct OrdersClient {
    http: Client,
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    per_page: u32,
}

impl OrdersClient {
    /// Create a client from a validated configuration.
    pub fn new(config: &RemoteConfig) -> Result<Self, SyncError> {
        config.validate()?;

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SyncError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            per_page: config.per_page,
        })
    }

    /// Fetch all orders matching the given filter, following pagination
    /// until a short page.
    ///
    /// A `None` status sends no filter at all (the server returns every
    /// status); the wildcard is sent literally as `any`.
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderDto>, SyncError> {
        let mut orders = Vec::new();

        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(page, self.per_page, status, after).await?;
            let short_page = (batch.len() as u32) < self.per_page;
            orders.extend(batch);

            if short_page {
                return Ok(orders);
            }
        }

        warn!(
            max_pages = MAX_PAGES,
            fetched = orders.len(),
            "page limit reached before a short page; result may be truncated"
        );
        Ok(orders)
    }

    /// Probe the remote with a one-record request.
    pub async fn probe(&self) -> Result<(), SyncError> {
        self.fetch_page(1, 1, None, None).await.map(|_| ())
    }

    /// Fetch a single page of orders.
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        status: Option<OrderStatus>,
        after: Option<DateTime<Utc>>,
    ) -> Result<Vec<OrderDto>, SyncError> {
        let url = format!("{}/wp-json/wc/v3/orders", self.base_url);

        let mut query: Vec<(&str, String)> = vec![
            ("consumer_key", self.consumer_key.clone()),
            ("consumer_secret", self.consumer_secret.clone()),
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
            ("orderby", "date".to_string()),
            ("order", "desc".to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.as_str().to_string()));
        }
        if let Some(after) = after {
            query.push(("after", after.format("%Y-%m-%dT%H:%M:%S").to_string()));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !http_status.is_success() {
            return Err(classify_failure(http_status, &body));
        }

        Self::decode_page(&body, page)
    }

    /// Decode one page, isolating malformed records: a bad record is
    /// logged and skipped, never fatal for the page.
    fn decode_page(body: &str, page: u32) -> Result<Vec<OrderDto>, SyncError> {
        let raw: Vec<serde_json::Value> = serde_json::from_str(body)
            .map_err(|e| SyncError::Parse(format!("page {page}: {e}")))?;

        let total = raw.len();
        let mut orders = Vec::with_capacity(total);
        for record in raw {
            let id = record.get("id").and_then(serde_json::Value::as_i64);
            match serde_json::from_value::<OrderDto>(record) {
                Ok(dto) => orders.push(dto),
                Err(e) => {
                    warn!(order_id = ?id, error = %e, "skipping malformed order record");
                }
            }
        }

        debug!(page, total, decoded = orders.len(), "page decoded");
        Ok(orders)
    }
}

/// Map an error response onto a [`SyncError`].
fn classify_failure(status: StatusCode, body: &str) -> SyncError {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SyncError::Unauthorized,
        StatusCode::BAD_REQUEST => SyncError::InvalidParameter(detail),
        _ => SyncError::Network(format!("{status}: {detail}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_unauthorized() {
        assert!(matches!(
            classify_failure(StatusCode::UNAUTHORIZED, "{}"),
            SyncError::Unauthorized
        ));
        assert!(matches!(
            classify_failure(StatusCode::FORBIDDEN, "{}"),
            SyncError::Unauthorized
        ));
    }

    #[test]
    fn classify_invalid_parameter_uses_body_message() {
        let body = r#"{"code":"rest_invalid_param","message":"status[0] is not one of pending"}"#;
        match classify_failure(StatusCode::BAD_REQUEST, body) {
            SyncError::InvalidParameter(msg) => assert!(msg.contains("status[0]")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classify_server_error_is_network() {
        assert!(matches!(
            classify_failure(StatusCode::BAD_GATEWAY, "upstream down"),
            SyncError::Network(_)
        ));
    }

    #[test]
    fn decode_page_skips_bad_records() {
        let body = r#"[
            {"id": 1, "status": "processing", "number": "1"},
            {"id": "not-a-number"},
            {"id": 3, "status": "completed", "number": "3"}
        ]"#;
        let orders = OrdersClient::decode_page(body, 1).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, 1);
        assert_eq!(orders[1].id, 3);
    }

    #[test]
    fn decode_page_rejects_non_array_payload() {
        assert!(matches!(
            OrdersClient::decode_page(r#"{"oops": true}"#, 1),
            Err(SyncError::Parse(_))
        ));
    }
}
