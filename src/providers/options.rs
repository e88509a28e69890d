//! Options-exchange volatility provider.
//!
//! Builds an [`IvSurface`] per symbol from the exchange's public endpoints:
//! index price, active option instruments, then tickers for the ATM call and
//! a bounded set of strikes around the money. Every failure degrades, first
//! to the smile mean and then to the hard-coded default volatility, so the
//! pipeline always gets a usable surface.

use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::client::http::HttpFetcher;
use crate::error::{BotError, Result};
use crate::types::{IvSurface, StrikeQuote};

/// Symbols the options exchange lists.
pub const OPTIONS_SUPPORTED: &[&str] = &["BTC", "ETH"];

/// Fallback annualized volatility per symbol when no options data exists.
const DEFAULT_VOL: &[(&str, f64)] = &[
    ("BTC", 0.55),
    ("ETH", 0.65),
    ("SOL", 0.90),
    ("XRP", 0.85),
    ("DOGE", 1.10),
];

const DEFAULT_VOL_FALLBACK: f64 = 0.70;

/// How many expiries and strikes-per-expiry the smile samples.
const SMILE_EXPIRIES: usize = 3;
const SMILE_STRIKES_PER_EXPIRY: usize = 10;

pub fn is_options_supported(symbol: &str) -> bool {
    OPTIONS_SUPPORTED.contains(&symbol)
}

/// Hard-coded default volatility for a symbol.
pub fn default_vol(symbol: &str) -> f64 {
    DEFAULT_VOL
        .iter()
        .find(|(sym, _)| *sym == symbol)
        .map(|(_, vol)| *vol)
        .unwrap_or(DEFAULT_VOL_FALLBACK)
}

#[derive(Debug, Deserialize)]
struct ApiResult<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct IndexPrice {
    index_price: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct Instrument {
    /// e.g. `BTC-27MAR26-120000-C`
    instrument_name: String,
    strike: f64,
    /// Milliseconds since epoch.
    expiration_timestamp: i64,
    option_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct Greeks {
    delta: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    /// Percent, e.g. 55.3 for 0.553.
    mark_iv: Option<f64>,
    #[serde(default)]
    greeks: Option<Greeks>,
}

/// Volatility provider over the options exchange's public API.
#[derive(Clone)]
pub struct OptionsClient {
    fetcher: HttpFetcher,
    base_url: String,
}

impl OptionsClient {
    pub fn new(base_url: &str, fetcher: HttpFetcher) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build the IV surface for a symbol. Never fails: unsupported symbols
    /// and upstream outages yield the default surface.
    pub async fn surface(&self, symbol: &str) -> IvSurface {
        if !is_options_supported(symbol) {
            return IvSurface::default_for(symbol, 0.0, default_vol(symbol));
        }

        match self.build_surface(symbol).await {
            Ok(surface) => surface,
            Err(e) => {
                warn!(symbol, error = %e, "options surface unavailable, using default vol");
                IvSurface::default_for(symbol, 0.0, default_vol(symbol))
            }
        }
    }

    async fn build_surface(&self, symbol: &str) -> Result<IvSurface> {
        let underlying = self.index_price(symbol).await?;
        let instruments = self.active_instruments(symbol).await?;
        if instruments.is_empty() {
            return Err(BotError::Api {
                status: 0,
                message: format!("no active option instruments for {}", symbol),
            });
        }

        let expiries = nearest_expiries(&instruments, SMILE_EXPIRIES);

        // ATM: single strike closest to the underlying on the nearest expiry.
        let mut atm_iv = None;
        if let Some(&nearest) = expiries.first() {
            if let Some(atm_call) = atm_call_instrument(&instruments, nearest, underlying) {
                match self.ticker(&atm_call.instrument_name).await {
                    Ok(ticker) => atm_iv = ticker.mark_iv.map(|iv| iv / 100.0),
                    Err(e) => debug!(symbol, error = %e, "ATM ticker fetch failed"),
                }
            }
        }

        let mut per_strike = Vec::new();
        let now = Utc::now();
        for &expiry_ms in &expiries {
            let expiry = match Utc.timestamp_millis_opt(expiry_ms).single() {
                Some(dt) => dt,
                None => continue,
            };
            let days_to_expiry = (expiry - now).num_seconds() as f64 / 86_400.0;

            for strike in smile_strikes(&instruments, expiry_ms, underlying) {
                let Some(call) = find_option(&instruments, expiry_ms, strike, "call") else {
                    continue;
                };
                let call_ticker = match self.ticker(&call.instrument_name).await {
                    Ok(t) => t,
                    Err(e) => {
                        debug!(instrument = %call.instrument_name, error = %e, "call ticker failed");
                        continue;
                    }
                };
                let Some(call_iv) = call_ticker.mark_iv.map(|iv| iv / 100.0) else {
                    continue;
                };
                let call_delta = call_ticker.greeks.unwrap_or_default().delta;

                let (put_iv, put_delta) =
                    match find_option(&instruments, expiry_ms, strike, "put") {
                        Some(put) => match self.ticker(&put.instrument_name).await {
                            Ok(t) => (
                                t.mark_iv.map(|iv| iv / 100.0),
                                t.greeks.unwrap_or_default().delta,
                            ),
                            Err(_) => (None, None),
                        },
                        None => (None, None),
                    };

                per_strike.push(StrikeQuote {
                    strike,
                    call_iv,
                    call_delta,
                    put_iv,
                    put_delta,
                    expiry,
                    days_to_expiry,
                });
            }
        }

        // Fallback ladder: ATM ticker -> smile mean -> default vol.
        let atm_iv = match atm_iv {
            Some(iv) if iv > 0.0 && iv <= 5.0 => iv,
            _ if !per_strike.is_empty() => {
                let mean =
                    per_strike.iter().map(|q| q.call_iv).sum::<f64>() / per_strike.len() as f64;
                debug!(symbol, mean, "ATM IV from smile mean");
                mean
            }
            _ => {
                return Err(BotError::Api {
                    status: 0,
                    message: format!("no usable IV for {}", symbol),
                })
            }
        };

        debug!(symbol, atm_iv, strikes = per_strike.len(), "built IV surface");
        Ok(IvSurface {
            symbol: symbol.to_string(),
            underlying_price: underlying,
            atm_iv,
            per_strike,
            is_default: false,
        })
    }

    async fn index_price(&self, symbol: &str) -> Result<f64> {
        let url = format!(
            "{}/public/get_index_price?index_name={}_usd",
            self.base_url,
            symbol.to_lowercase()
        );
        let resp: ApiResult<IndexPrice> = self.fetcher.get_json(&url).await?;
        Ok(resp.result.index_price)
    }

    async fn active_instruments(&self, symbol: &str) -> Result<Vec<Instrument>> {
        let url = format!(
            "{}/public/get_instruments?currency={}&kind=option&expired=false",
            self.base_url, symbol
        );
        let resp: ApiResult<Vec<Instrument>> = self.fetcher.get_json(&url).await?;
        let now_ms = Utc::now().timestamp_millis();
        Ok(resp
            .result
            .into_iter()
            .filter(|i| i.expiration_timestamp > now_ms)
            .collect())
    }

    async fn ticker(&self, instrument_name: &str) -> Result<Ticker> {
        let url = format!(
            "{}/public/ticker?instrument_name={}",
            self.base_url, instrument_name
        );
        let resp: ApiResult<Ticker> = self.fetcher.get_json(&url).await?;
        Ok(resp.result)
    }
}

/// Distinct expiries, soonest first, capped at `count`.
fn nearest_expiries(instruments: &[Instrument], count: usize) -> Vec<i64> {
    let mut expiries: Vec<i64> = instruments.iter().map(|i| i.expiration_timestamp).collect();
    expiries.sort_unstable();
    expiries.dedup();
    expiries.truncate(count);
    expiries
}

/// The call whose strike is closest to the underlying on one expiry.
fn atm_call_instrument<'a>(
    instruments: &'a [Instrument],
    expiry_ms: i64,
    underlying: f64,
) -> Option<&'a Instrument> {
    instruments
        .iter()
        .filter(|i| i.expiration_timestamp == expiry_ms && i.option_type == "call")
        .min_by(|a, b| {
            let da = (a.strike - underlying).abs();
            let db = (b.strike - underlying).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// Strikes for one expiry: closest-to-ATM first, bounded to [0.5·S, 2·S],
/// at most ten.
fn smile_strikes(instruments: &[Instrument], expiry_ms: i64, underlying: f64) -> Vec<f64> {
    let mut strikes: Vec<f64> = instruments
        .iter()
        .filter(|i| i.expiration_timestamp == expiry_ms && i.option_type == "call")
        .map(|i| i.strike)
        .filter(|s| *s >= 0.5 * underlying && *s <= 2.0 * underlying)
        .collect();
    strikes.sort_by(|a, b| {
        let da = (a - underlying).abs();
        let db = (b - underlying).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    strikes.dedup();
    strikes.truncate(SMILE_STRIKES_PER_EXPIRY);
    strikes
}

fn find_option<'a>(
    instruments: &'a [Instrument],
    expiry_ms: i64,
    strike: f64,
    option_type: &str,
) -> Option<&'a Instrument> {
    instruments.iter().find(|i| {
        i.expiration_timestamp == expiry_ms && i.strike == strike && i.option_type == option_type
    })
}
