//! CLOB (Central Limit Order Book) API client.
//!
//! Reads the top of book for an outcome token and places fill-or-kill
//! orders. Authenticated calls sign each request through the caller's
//! [`AuthSession`](crate::client::auth::AuthSession).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::auth::AuthSession;
use crate::client::http::{check_status, HttpFetcher};
use crate::error::{BotError, Result};

/// CLOB API client.
#[derive(Clone)]
pub struct ClobClient {
    fetcher: HttpFetcher,
    base_url: String,
}

/// One side of the book at one price. Upstream quotes prices and sizes as
/// decimal strings; `Decimal`'s deserializer accepts them directly.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Order book snapshot for a single outcome token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }
}

/// Fill-or-kill order request body.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    #[serde(rename = "tokenID")]
    pub token_id: String,
    /// BUY or SELL.
    pub side: String,
    /// Shares, decimal string.
    pub size: String,
    /// Limit price, decimal string.
    pub price: String,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(rename = "feeRateBps")]
    pub fee_rate_bps: String,
}

impl OrderRequest {
    pub fn fok_buy(token_id: &str, size: Decimal, price: Decimal) -> Self {
        Self {
            token_id: token_id.to_string(),
            side: "BUY".to_string(),
            size: size.to_string(),
            price: price.to_string(),
            order_type: "FOK".to_string(),
            fee_rate_bps: "0".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderID", default)]
    order_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ClobClient {
    pub fn new(base_url: &str, fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// The shared HTTP client, for credential derivation against this host.
    pub fn fetcher_client(&self) -> &reqwest::Client {
        self.fetcher.client()
    }

    /// Top-of-book snapshot for one outcome token.
    pub async fn order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        self.fetcher.get_json(&url).await
    }

    /// Place a fill-or-kill order. Any 2xx response is a fill.
    pub async fn place_order(
        &self,
        session: &AuthSession,
        order: &OrderRequest,
    ) -> Result<String> {
        let path = "/order";
        let body = serde_json::to_string(order)?;
        let headers = session.sign_request("POST", path, &body)?;

        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .fetcher
            .client()
            .post(&url)
            .header("POLY_ADDRESS", &headers.address)
            .header("POLY_API_KEY", &headers.api_key)
            .header("POLY_SIGNATURE", &headers.signature)
            .header("POLY_TIMESTAMP", &headers.timestamp)
            .header("POLY_PASSPHRASE", &headers.passphrase)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        let resp = check_status(resp).await.map_err(|e| match e {
            BotError::Api { status, message } => {
                BotError::Execution(format!("order rejected ({}): {}", status, message))
            }
            other => other,
        })?;

        let parsed: OrderResponse = resp.json().await.unwrap_or(OrderResponse {
            order_id: None,
            status: None,
        });
        debug!(order_id = ?parsed.order_id, status = ?parsed.status, "order accepted");

        Ok(parsed
            .order_id
            .unwrap_or_else(|| format!("fok-{}", uuid::Uuid::new_v4())))
    }
}
