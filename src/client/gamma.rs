//! Prediction-market catalog client.
//!
//! Fetches the most-active markets in one paginated call. The upstream is
//! loose about field encodings: `outcomes`, `outcomePrices` and
//! `clobTokenIds` arrive either as JSON arrays or as JSON *strings containing*
//! arrays, with prices as numbers or decimal strings. Each field is decoded
//! into an explicit variant and normalized here, so the rest of the system
//! only ever sees one shape.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use crate::client::http::HttpFetcher;
use crate::error::Result;

/// Catalog client for market data.
#[derive(Clone)]
pub struct GammaClient {
    fetcher: HttpFetcher,
    base_url: String,
}

/// A catalog entry with upstream encodings already normalized.
#[derive(Debug, Clone)]
pub struct CatalogMarket {
    pub id: String,
    pub question: String,
    pub end_date: Option<DateTime<Utc>>,
    pub volume_24h: Decimal,
    /// Outcome prices in catalog order; the first is the YES price.
    pub outcome_prices: Vec<Decimal>,
    /// CLOB token ids in catalog order: [YES, NO].
    pub clob_token_ids: Vec<String>,
}

/// A field that is either a JSON array or a JSON string containing one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum MaybeEncoded {
    Encoded(String),
    Plain(Vec<serde_json::Value>),
}

impl MaybeEncoded {
    fn into_values(self) -> Vec<serde_json::Value> {
        match self {
            MaybeEncoded::Plain(values) => values,
            MaybeEncoded::Encoded(raw) => serde_json::from_str(&raw).unwrap_or_default(),
        }
    }

    fn into_strings(self) -> Vec<String> {
        self.into_values()
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Prices arrive as decimal strings or plain numbers.
    fn into_decimals(self) -> Vec<Decimal> {
        self.into_values()
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => s.parse().ok(),
                serde_json::Value::Number(n) => {
                    n.as_f64().and_then(|f| Decimal::try_from(f).ok())
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GammaMarket {
    #[serde(rename = "conditionId")]
    condition_id: Option<String>,
    id: Option<String>,
    question: Option<String>,
    #[serde(rename = "endDate")]
    end_date: Option<String>,
    #[serde(rename = "volume24hr")]
    volume_24hr: Option<f64>,
    #[serde(rename = "outcomePrices")]
    outcome_prices: Option<MaybeEncoded>,
    #[serde(rename = "clobTokenIds")]
    clob_token_ids: Option<MaybeEncoded>,
}

impl GammaClient {
    pub fn new(base_url: &str, fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch up to `limit` active markets ordered by 24h volume, descending.
    pub async fn top_markets(&self, limit: usize) -> Result<Vec<CatalogMarket>> {
        let url = format!(
            "{}/markets?active=true&closed=false&limit={}&order=volume24hr&ascending=false",
            self.base_url, limit
        );
        let raw: Vec<GammaMarket> = self.fetcher.get_json(&url).await?;
        let markets: Vec<CatalogMarket> = raw.into_iter().filter_map(normalize_market).collect();
        debug!(count = markets.len(), limit, "fetched catalog markets");
        Ok(markets)
    }
}

fn normalize_market(gm: GammaMarket) -> Option<CatalogMarket> {
    let id = gm.condition_id.or(gm.id)?;
    let question = gm.question?;

    let outcome_prices = gm
        .outcome_prices
        .map(MaybeEncoded::into_decimals)
        .unwrap_or_default();
    let clob_token_ids = gm
        .clob_token_ids
        .map(MaybeEncoded::into_strings)
        .unwrap_or_default();

    Some(CatalogMarket {
        id,
        question,
        end_date: gm.end_date.as_deref().and_then(|s| s.parse().ok()),
        volume_24h: gm
            .volume_24hr
            .and_then(|v| Decimal::try_from(v).ok())
            .unwrap_or(Decimal::ZERO),
        outcome_prices,
        clob_token_ids,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decodes_string_encoded_fields() {
        let raw = r#"{
            "conditionId": "0xabc",
            "question": "Will Bitcoin hit $200k by December 31, 2025?",
            "endDate": "2025-12-31T23:59:59Z",
            "volume24hr": 12345.5,
            "outcomePrices": "[\"0.55\", \"0.45\"]",
            "clobTokenIds": "[\"111\", \"222\"]"
        }"#;
        let gm: GammaMarket = serde_json::from_str(raw).unwrap();
        let market = normalize_market(gm).unwrap();

        assert_eq!(market.id, "0xabc");
        assert_eq!(market.outcome_prices, vec![dec!(0.55), dec!(0.45)]);
        assert_eq!(market.clob_token_ids, vec!["111", "222"]);
        assert!(market.end_date.is_some());
    }

    #[test]
    fn decodes_plain_array_fields() {
        let raw = r#"{
            "id": "42",
            "question": "q",
            "outcomePrices": [0.30, 0.70],
            "clobTokenIds": ["yes-token", "no-token"]
        }"#;
        let gm: GammaMarket = serde_json::from_str(raw).unwrap();
        let market = normalize_market(gm).unwrap();

        assert_eq!(market.id, "42");
        assert_eq!(market.outcome_prices, vec![dec!(0.30), dec!(0.70)]);
        assert_eq!(market.volume_24h, Decimal::ZERO);
    }

    #[test]
    fn condition_id_takes_precedence() {
        let raw = r#"{"conditionId": "cond", "id": "numeric", "question": "q"}"#;
        let gm: GammaMarket = serde_json::from_str(raw).unwrap();
        assert_eq!(normalize_market(gm).unwrap().id, "cond");
    }

    #[test]
    fn missing_question_is_dropped() {
        let raw = r#"{"id": "42"}"#;
        let gm: GammaMarket = serde_json::from_str(raw).unwrap();
        assert!(normalize_market(gm).is_none());
    }

    #[test]
    fn garbage_encoded_fields_become_empty() {
        let raw = r#"{"id": "42", "question": "q", "outcomePrices": "not json"}"#;
        let gm: GammaMarket = serde_json::from_str(raw).unwrap();
        let market = normalize_market(gm).unwrap();
        assert!(market.outcome_prices.is_empty());
    }
}
