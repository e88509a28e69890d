//! Opportunity pipeline: catalog → parse → enrich → rank.
//!
//! Fans the most-active markets through the question parser, joins the
//! surviving claims with spot prices and per-symbol volatility surfaces, and
//! computes model-vs-market edges. Per-claim failures skip the claim and
//! per-symbol IV failures degrade to the default vol; only a total spot-price
//! outage (or an upstream rate limit) fails the whole run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::client::gamma::{CatalogMarket, GammaClient};
use crate::config::VolMode;
use crate::engine;
use crate::error::Result;
use crate::providers::options::{default_vol, is_options_supported, OptionsClient};
use crate::providers::spot::SpotPriceClient;
use crate::types::{IvSurface, MarketSnapshot, Opportunity, SpotPrice};

/// Bound on concurrent per-symbol surface fetches.
const MAX_CONCURRENT_SURFACES: usize = 10;

/// Days of history used for realized-vol estimation.
const REALIZED_VOL_DAYS: u32 = 30;

pub struct OpportunityPipeline {
    gamma: GammaClient,
    spot: SpotPriceClient,
    options: OptionsClient,
    vol_mode: VolMode,
}

impl OpportunityPipeline {
    pub fn new(
        gamma: GammaClient,
        spot: SpotPriceClient,
        options: OptionsClient,
        vol_mode: VolMode,
    ) -> Self {
        Self { gamma, spot, options, vol_mode }
    }

    /// Produce up to `limit` opportunities ranked by absolute edge.
    pub async fn opportunities(&self, limit: usize) -> Result<Vec<Opportunity>> {
        let now = Utc::now();
        let markets = self.gamma.top_markets(limit * 3).await?;
        debug!(fetched = markets.len(), "catalog markets fetched");

        let mut snapshots = Vec::new();
        for market in markets {
            if snapshots.len() >= limit {
                break;
            }
            if let Some(snapshot) = build_snapshot(market, now) {
                snapshots.push(snapshot);
            }
        }
        if snapshots.is_empty() {
            return Ok(Vec::new());
        }

        let mut symbols: Vec<String> =
            snapshots.iter().map(|s| s.claim.symbol.clone()).collect();
        symbols.sort();
        symbols.dedup();

        // A rate limit or a total outage here aborts the run; partial quotes
        // just drop the unquoted claims below.
        let quotes = self.spot.prices(&symbols).await?;

        let surfaces: HashMap<String, IvSurface> = stream::iter(symbols)
            .map(|symbol| async move {
                let surface = self.surface_for(&symbol).await;
                (symbol, surface)
            })
            .buffer_unordered(MAX_CONCURRENT_SURFACES)
            .collect()
            .await;

        let mut opportunities: Vec<Opportunity> = snapshots
            .into_iter()
            .filter_map(|snapshot| enrich_snapshot(snapshot, &quotes, &surfaces, now))
            .collect();

        rank(&mut opportunities);
        info!(count = opportunities.len(), "opportunity scan complete");
        Ok(opportunities)
    }

    /// Surface for one symbol, honoring the configured vol mode for symbols
    /// the options exchange does not list.
    async fn surface_for(&self, symbol: &str) -> IvSurface {
        if self.vol_mode == VolMode::Realized && !is_options_supported(symbol) {
            if let Ok(series) = self.spot.historical_series(symbol, REALIZED_VOL_DAYS).await {
                if let Some(vol) = engine::realized_volatility(&series) {
                    if vol > 0.0 {
                        debug!(symbol, vol, "using realized volatility");
                        return IvSurface::default_for(symbol, 0.0, vol);
                    }
                }
            }
            return IvSurface::default_for(symbol, 0.0, default_vol(symbol));
        }
        self.options.surface(symbol).await
    }
}

/// Parse one catalog market into a snapshot, dropping non-crypto questions,
/// resolved prices and markets without both outcome tokens.
pub fn build_snapshot(market: CatalogMarket, now: DateTime<Utc>) -> Option<MarketSnapshot> {
    let claim = crate::parser::parse_claim_at(
        &market.id,
        &market.question,
        market.end_date,
        now,
    )?;

    let polymarket_prob = *market.outcome_prices.first()?;
    if polymarket_prob <= Decimal::ZERO || polymarket_prob >= Decimal::ONE {
        return None;
    }

    let [yes_token_id, no_token_id] = match market.clob_token_ids.as_slice() {
        [yes, no, ..] => [yes.clone(), no.clone()],
        _ => return None,
    };

    Some(MarketSnapshot {
        claim,
        polymarket_prob,
        yes_token_id,
        no_token_id,
        volume_24h: market.volume_24h,
    })
}

/// Join one snapshot with its spot quote and surface and compute both
/// estimates and edges. `None` skips the claim.
pub fn enrich_snapshot(
    snapshot: MarketSnapshot,
    quotes: &HashMap<String, SpotPrice>,
    surfaces: &HashMap<String, IvSurface>,
    now: DateTime<Utc>,
) -> Option<Opportunity> {
    let claim = &snapshot.claim;

    let Some(spot) = quotes.get(&claim.symbol) else {
        debug!(market_id = %claim.market_id, symbol = %claim.symbol, "no spot quote, skipping");
        return None;
    };

    let time_years = claim.time_to_expiry_years(now);
    if time_years <= 0.0 {
        return None;
    }

    let surface = surfaces.get(&claim.symbol).cloned().unwrap_or_else(|| {
        IvSurface::default_for(&claim.symbol, spot.price, default_vol(&claim.symbol))
    });

    let zscore_estimate = engine::zscore_estimate(
        spot.price,
        claim.target_price,
        surface.atm_iv,
        time_years,
        claim.bet_type,
        claim.direction,
    );

    let delta_estimate = if surface.is_default {
        None
    } else {
        surface.iv_for_strike(claim.target_price).and_then(|smile| {
            engine::options_delta_estimate(
                spot.price,
                claim.target_price,
                smile.iv,
                smile.delta,
                time_years,
                claim.bet_type,
                claim.direction,
            )
        })
    };

    let market_prob = snapshot.prob_f64();
    let edge_z = market_prob - zscore_estimate.probability;
    let edge_delta = delta_estimate.as_ref().map(|e| market_prob - e.probability);

    let effective_edge = edge_delta.unwrap_or(edge_z);
    let (signal, confidence) = engine::classify_edge(effective_edge);

    let spot = spot.clone();
    let surface = (!surface.is_default).then_some(surface);

    Some(Opportunity {
        snapshot,
        spot,
        surface,
        zscore_estimate,
        delta_estimate,
        edge_z,
        edge_delta,
        signal,
        confidence,
    })
}

/// Rank by the larger absolute edge, descending; ties by 24h volume then by
/// earlier expiry.
pub fn rank(opportunities: &mut [Opportunity]) {
    opportunities.sort_by(|a, b| {
        b.rank_edge()
            .partial_cmp(&a.rank_edge())
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.snapshot.volume_24h.cmp(&a.snapshot.volume_24h))
            .then_with(|| a.snapshot.claim.expiry.cmp(&b.snapshot.claim.expiry))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BetType, CryptoClaim, Direction, StrikeQuote};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn catalog_market(id: &str, question: &str, yes_price: Decimal) -> CatalogMarket {
        CatalogMarket {
            id: id.to_string(),
            question: question.to_string(),
            end_date: None,
            volume_24h: dec!(10000),
            outcome_prices: vec![yes_price, Decimal::ONE - yes_price],
            clob_token_ids: vec!["yes-tok".to_string(), "no-tok".to_string()],
        }
    }

    fn quotes(symbol: &str, price: f64) -> HashMap<String, SpotPrice> {
        let mut map = HashMap::new();
        map.insert(
            symbol.to_string(),
            SpotPrice { symbol: symbol.to_string(), price, as_of: now() },
        );
        map
    }

    fn snapshot(market_id: &str, prob: Decimal, volume: Decimal, expiry_year: i32) -> MarketSnapshot {
        MarketSnapshot {
            claim: CryptoClaim {
                market_id: market_id.to_string(),
                question: "q".to_string(),
                symbol: "BTC".to_string(),
                target_price: 150_000.0,
                expiry: Utc.with_ymd_and_hms(expiry_year, 12, 31, 23, 59, 59).unwrap(),
                bet_type: BetType::Binary,
                direction: Direction::Above,
            },
            polymarket_prob: prob,
            yes_token_id: "y".to_string(),
            no_token_id: "n".to_string(),
            volume_24h: volume,
        }
    }

    #[test]
    fn snapshot_requires_parseable_crypto_question() {
        let market = catalog_market("m1", "Will Bitcoin reach $150k in 2025?", dec!(0.30));
        assert!(build_snapshot(market, now()).is_some());

        let politics = catalog_market("m2", "Will the incumbent win in 2025?", dec!(0.30));
        assert!(build_snapshot(politics, now()).is_none());
    }

    #[test]
    fn snapshot_drops_resolved_markets() {
        for price in [dec!(0), dec!(1)] {
            let market = catalog_market("m1", "Will Bitcoin reach $150k in 2025?", price);
            assert!(build_snapshot(market, now()).is_none());
        }
    }

    #[test]
    fn snapshot_requires_both_tokens() {
        let mut market = catalog_market("m1", "Will Bitcoin reach $150k in 2025?", dec!(0.30));
        market.clob_token_ids = vec!["only-one".to_string()];
        assert!(build_snapshot(market, now()).is_none());
    }

    #[test]
    fn enrich_skips_unquoted_symbols() {
        let snap = snapshot("m1", dec!(0.30), dec!(1000), 2025);
        let result = enrich_snapshot(snap, &HashMap::new(), &HashMap::new(), now());
        assert!(result.is_none());
    }

    #[test]
    fn enrich_default_surface_has_no_delta_estimate() {
        let snap = snapshot("m1", dec!(0.30), dec!(1000), 2025);
        let mut surfaces = HashMap::new();
        surfaces.insert(
            "BTC".to_string(),
            IvSurface::default_for("BTC", 100_000.0, 0.55),
        );
        let opp =
            enrich_snapshot(snap, &quotes("BTC", 100_000.0), &surfaces, now()).unwrap();
        assert!(opp.delta_estimate.is_none());
        assert!(opp.edge_delta.is_none());
        assert!(opp.surface.is_none());
        assert_eq!(opp.effective_edge(), opp.edge_z);
    }

    #[test]
    fn enrich_live_surface_emits_both_estimates() {
        let snap = snapshot("m1", dec!(0.30), dec!(1000), 2025);
        let surface = IvSurface {
            symbol: "BTC".to_string(),
            underlying_price: 100_000.0,
            atm_iv: 0.55,
            per_strike: vec![StrikeQuote {
                strike: 150_000.0,
                call_iv: 0.62,
                call_delta: Some(0.18),
                put_iv: Some(0.60),
                put_delta: Some(-0.82),
                expiry: Utc.with_ymd_and_hms(2025, 12, 26, 8, 0, 0).unwrap(),
                days_to_expiry: 208.0,
            }],
            is_default: false,
        };
        let mut surfaces = HashMap::new();
        surfaces.insert("BTC".to_string(), surface);

        let opp =
            enrich_snapshot(snap, &quotes("BTC", 100_000.0), &surfaces, now()).unwrap();
        let delta_est = opp.delta_estimate.as_ref().unwrap();
        assert!((delta_est.probability - 0.18).abs() < 1e-12);
        assert!(opp.edge_delta.is_some());
        assert!((opp.effective_edge() - (0.30 - 0.18)).abs() < 1e-12);
    }

    #[test]
    fn enrich_skips_expired_claims() {
        let snap = snapshot("m1", dec!(0.30), dec!(1000), 2024);
        let result = enrich_snapshot(snap, &quotes("BTC", 100_000.0), &HashMap::new(), now());
        assert!(result.is_none());
    }

    fn bare_opportunity(
        market_id: &str,
        edge_z: f64,
        edge_delta: Option<f64>,
        volume: Decimal,
        expiry_year: i32,
    ) -> Opportunity {
        let snap = snapshot(market_id, dec!(0.30), volume, expiry_year);
        let estimate = engine::zscore_estimate(
            100_000.0, 150_000.0, 0.55, 0.5, BetType::Binary, Direction::Above,
        );
        let (signal, confidence) = engine::classify_edge(edge_delta.unwrap_or(edge_z));
        Opportunity {
            spot: SpotPrice { symbol: "BTC".to_string(), price: 100_000.0, as_of: now() },
            snapshot: snap,
            surface: None,
            zscore_estimate: estimate,
            delta_estimate: None,
            edge_z,
            edge_delta,
            signal,
            confidence,
        }
    }

    #[test]
    fn rank_orders_by_max_abs_edge() {
        let mut opps = vec![
            bare_opportunity("small", 0.04, None, dec!(100), 2025),
            bare_opportunity("delta-big", 0.02, Some(-0.20), dec!(100), 2025),
            bare_opportunity("mid", -0.10, None, dec!(100), 2025),
        ];
        rank(&mut opps);
        let ids: Vec<&str> = opps.iter().map(|o| o.snapshot.claim.market_id.as_str()).collect();
        assert_eq!(ids, vec!["delta-big", "mid", "small"]);
    }

    #[test]
    fn rank_ties_break_on_volume_then_expiry() {
        let mut opps = vec![
            bare_opportunity("late", 0.10, None, dec!(100), 2026),
            bare_opportunity("big-volume", 0.10, None, dec!(900), 2026),
            bare_opportunity("early", 0.10, None, dec!(100), 2025),
        ];
        rank(&mut opps);
        let ids: Vec<&str> = opps.iter().map(|o| o.snapshot.claim.market_id.as_str()).collect();
        assert_eq!(ids, vec!["big-volume", "early", "late"]);
    }
}
