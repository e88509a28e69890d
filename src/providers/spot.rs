//! Spot price oracle client.
//!
//! Bulk-fetches USD quotes for the supported symbols in a single upstream
//! call. A 429 from the oracle surfaces as [`BotError::RateLimited`] so the
//! trading cycle backs off instead of retrying immediately.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tracing::debug;

use crate::client::http::HttpFetcher;
use crate::error::{BotError, Result};
use crate::types::SpotPrice;

/// Symbol → oracle coin id for every symbol the parser can emit.
const COIN_IDS: &[(&str, &str)] = &[
    ("BTC", "bitcoin"),
    ("ETH", "ethereum"),
    ("SOL", "solana"),
    ("XRP", "ripple"),
    ("DOGE", "dogecoin"),
    ("ADA", "cardano"),
    ("LINK", "chainlink"),
    ("AVAX", "avalanche-2"),
];

fn coin_id(symbol: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map(|(_, id)| *id)
}

fn symbol_for(id: &str) -> Option<&'static str> {
    COIN_IDS
        .iter()
        .find(|(_, coin)| *coin == id)
        .map(|(sym, _)| *sym)
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    current_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(i64, f64)>,
}

/// Oracle client.
#[derive(Clone)]
pub struct SpotPriceClient {
    fetcher: HttpFetcher,
    base_url: String,
}

impl SpotPriceClient {
    pub fn new(base_url: &str, fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Current USD quotes for `symbols`, one upstream call. Unknown symbols
    /// are simply absent from the result; a fully empty result for a
    /// non-empty request is [`BotError::PricesUnavailable`].
    pub async fn prices(&self, symbols: &[String]) -> Result<HashMap<String, SpotPrice>> {
        let ids: Vec<&str> = symbols.iter().filter_map(|s| coin_id(s)).collect();
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/coins/markets?vs_currency=usd&ids={}",
            self.base_url,
            ids.join(",")
        );
        let entries: Vec<MarketEntry> = self.fetcher.get_json(&url).await?;

        let now = Utc::now();
        let mut quotes = HashMap::new();
        for entry in entries {
            let Some(symbol) = symbol_for(&entry.id) else { continue };
            let Some(price) = entry.current_price else { continue };
            if price <= 0.0 {
                continue;
            }
            quotes.insert(
                symbol.to_string(),
                SpotPrice {
                    symbol: symbol.to_string(),
                    price,
                    as_of: now,
                },
            );
        }

        debug!(requested = symbols.len(), quoted = quotes.len(), "fetched spot prices");
        if quotes.is_empty() {
            return Err(BotError::PricesUnavailable);
        }
        Ok(quotes)
    }

    /// Daily close series over the last `days` days, oldest first. Used for
    /// realized-volatility estimation.
    pub async fn historical_series(&self, symbol: &str, days: u32) -> Result<Vec<f64>> {
        let id = coin_id(symbol).ok_or_else(|| BotError::Api {
            status: 0,
            message: format!("unknown symbol {}", symbol),
        })?;

        let url = format!(
            "{}/coins/{}/market_chart?vs_currency=usd&days={}&interval=daily",
            self.base_url, id, days
        );
        let chart: MarketChart = self.fetcher.get_json(&url).await?;
        Ok(chart.prices.into_iter().map(|(_, price)| price).collect())
    }
}
