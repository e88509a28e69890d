//! Core domain types.
//!
//! Money (balances, notionals, contract prices, P&L) is `Decimal`; model
//! quantities (probabilities, volatilities, edges) are `f64` and cross over
//! at the pipeline/trader boundary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::BotConfig;

/// Whether a market pays on settlement or on touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BetType {
    Binary,
    OneTouch,
}

/// Which side of the target the question asks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

/// A market question parsed into a structured crypto price claim.
///
/// Immutable once parsed; two claims with the same `market_id` are equal by
/// construction because parsing is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoClaim {
    pub market_id: String,
    pub question: String,
    pub symbol: String,
    pub target_price: f64,
    pub expiry: DateTime<Utc>,
    pub bet_type: BetType,
    pub direction: Direction,
}

impl CryptoClaim {
    /// Time to expiry in years from `now`. Negative when expired.
    pub fn time_to_expiry_years(&self, now: DateTime<Utc>) -> f64 {
        (self.expiry - now).num_seconds() as f64 / (365.0 * 86_400.0)
    }

    pub fn days_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        (self.expiry - now).num_seconds() as f64 / 86_400.0
    }
}

/// A live market joined with its current market-implied probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub claim: CryptoClaim,
    /// First-outcome (YES) price in (0,1). 0 or 1 means resolved and is
    /// filtered out upstream.
    pub polymarket_prob: Decimal,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub volume_24h: Decimal,
}

impl MarketSnapshot {
    pub fn prob_f64(&self) -> f64 {
        self.polymarket_prob.to_f64().unwrap_or(0.0)
    }
}

/// Latest USD quote for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPrice {
    pub symbol: String,
    pub price: f64,
    pub as_of: DateTime<Utc>,
}

/// Per-strike option quote inside an [`IvSurface`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeQuote {
    pub strike: f64,
    pub call_iv: f64,
    pub call_delta: Option<f64>,
    pub put_iv: Option<f64>,
    pub put_delta: Option<f64>,
    pub expiry: DateTime<Utc>,
    pub days_to_expiry: f64,
}

/// Volatility lookup result for a target strike.
#[derive(Debug, Clone, Copy)]
pub struct SmileQuote {
    pub iv: f64,
    /// Present only when the quoted strike is close enough to the target
    /// for the exchange delta to be meaningful.
    pub delta: Option<f64>,
}

/// Options-derived volatility surface for one symbol.
///
/// For symbols the options exchange does not list, `is_default` is set and
/// `atm_iv` carries the hard-coded default volatility with an empty smile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvSurface {
    pub symbol: String,
    pub underlying_price: f64,
    pub atm_iv: f64,
    pub per_strike: Vec<StrikeQuote>,
    pub is_default: bool,
}

impl IvSurface {
    /// Default-vol surface with an empty smile.
    pub fn default_for(symbol: &str, underlying_price: f64, atm_iv: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            underlying_price,
            atm_iv,
            per_strike: Vec::new(),
            is_default: true,
        }
    }

    /// Pick the closest quoted strike to `target`. The exchange delta is
    /// returned only when the quoted strike is within 20% relative distance
    /// of the target; otherwise the caller derives delta from the IV.
    pub fn iv_for_strike(&self, target: f64) -> Option<SmileQuote> {
        let quote = self
            .per_strike
            .iter()
            .min_by(|a, b| {
                let da = (a.strike - target).abs();
                let db = (b.strike - target).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })?;

        let relative = (quote.strike - target).abs() / target;
        let delta = if relative < 0.20 { quote.call_delta } else { None };
        Some(SmileQuote { iv: quote.call_iv, delta })
    }
}

/// Which model produced a probability estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbMethod {
    Zscore,
    OptionsDelta,
    VerticalSpread,
}

/// A model-implied probability with the inputs that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbabilityEstimate {
    pub method: ProbMethod,
    /// Clamped to [0,1].
    pub probability: f64,
    pub volatility_used: f64,
    pub time_to_expiry_years: f64,
    pub z_score: Option<f64>,
    pub delta: Option<f64>,
    /// Human-readable derivation steps. Advisory only.
    pub audit_trail: Vec<String>,
}

/// Trade signal from the edge classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSignal {
    Buy,
    Sell,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A fully enriched market: snapshot + spot + model estimates + edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub snapshot: MarketSnapshot,
    pub spot: SpotPrice,
    pub surface: Option<IvSurface>,
    pub zscore_estimate: ProbabilityEstimate,
    pub delta_estimate: Option<ProbabilityEstimate>,
    /// polymarket_prob - zscore probability.
    pub edge_z: f64,
    /// polymarket_prob - options-delta probability, when available.
    pub edge_delta: Option<f64>,
    pub signal: TradeSignal,
    pub confidence: Confidence,
}

impl Opportunity {
    /// The edge used for gating and sizing: options-delta when present,
    /// z-score otherwise.
    pub fn effective_edge(&self) -> f64 {
        self.edge_delta.unwrap_or(self.edge_z)
    }

    /// The model probability matching [`Self::effective_edge`].
    pub fn effective_model_prob(&self) -> f64 {
        self.delta_estimate
            .as_ref()
            .map(|e| e.probability)
            .unwrap_or(self.zscore_estimate.probability)
    }

    /// Ranking key: the larger absolute edge of the two estimates.
    pub fn rank_edge(&self) -> f64 {
        let z = self.edge_z.abs();
        match self.edge_delta {
            Some(d) => z.max(d.abs()),
            None => z,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloseReason {
    EdgeAligned,
    Expired,
    Manual,
}

/// An open or settled position in one market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub market_id: String,
    pub symbol: String,
    pub target_price: f64,
    pub direction: Direction,
    pub bet_type: BetType,
    pub expiry: DateTime<Utc>,
    pub side: PositionSide,
    /// YES-frame entry price in (0,1).
    pub entry_price: Decimal,
    pub notional: Decimal,
    /// notional / effective entry price.
    pub shares: Decimal,
    pub entry_edge: f64,
    pub entry_time: DateTime<Utc>,
    pub current_price: Decimal,
    pub current_edge: f64,
    pub unrealized_pnl: Decimal,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    pub close_price: Option<Decimal>,
    pub close_time: Option<DateTime<Utc>>,
    pub realized_pnl: Option<Decimal>,
}

impl Position {
    /// What one share cost at entry: the YES price for a long, the NO price
    /// for a short.
    pub fn effective_entry_price(&self) -> Decimal {
        match self.side {
            PositionSide::Long => self.entry_price,
            PositionSide::Short => Decimal::ONE - self.entry_price,
        }
    }

    /// P&L against a YES-frame price.
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        match self.side {
            PositionSide::Long => self.shares * (price - self.entry_price),
            PositionSide::Short => self.shares * (self.entry_price - price),
        }
    }

    /// Refresh mark price, edge and unrealized P&L.
    pub fn mark(&mut self, price: Decimal, edge: f64) {
        self.current_price = price;
        self.current_edge = edge;
        self.unrealized_pnl = self.pnl_at(price);
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Open,
    Close,
}

/// One entry in the append-only trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub position_id: String,
    pub market_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: TradeAction,
    pub side: PositionSide,
    /// YES-frame price.
    pub price: Decimal,
    pub notional: Decimal,
    pub shares: Decimal,
    pub edge: f64,
    pub zscore_prob: f64,
    pub delta_prob: Option<f64>,
    pub spot_at_trade: f64,
    /// Set only on close.
    pub pnl: Option<Decimal>,
}

/// Full persisted trading state. Mutated only by the trading state machine
/// and written atomically after every cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub starting_balance: Decimal,
    pub current_balance: Decimal,
    pub total_realized_pnl: Decimal,
    /// Open positions keyed by market id; at most one per market.
    pub open_positions: HashMap<String, Position>,
    pub closed_positions: Vec<Position>,
    pub trades: Vec<Trade>,
    pub is_running: bool,
    pub last_update: DateTime<Utc>,
    pub last_error: Option<String>,
    pub win_count: u32,
    pub loss_count: u32,
    pub config: BotConfig,
    /// Written by the live machine only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_exposure: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_exposure: Option<Decimal>,
}

impl BotState {
    pub fn new(config: BotConfig) -> Self {
        Self {
            starting_balance: config.starting_balance,
            current_balance: config.starting_balance,
            total_realized_pnl: Decimal::ZERO,
            open_positions: HashMap::new(),
            closed_positions: Vec::new(),
            trades: Vec::new(),
            is_running: false,
            last_update: Utc::now(),
            last_error: None,
            win_count: 0,
            loss_count: 0,
            config,
            max_exposure: None,
            current_exposure: None,
        }
    }

    /// Sum of open notionals.
    pub fn total_open_notional(&self) -> Decimal {
        self.open_positions.values().map(|p| p.notional).sum()
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.win_count + self.loss_count;
        if total == 0 {
            return 0.0;
        }
        self.win_count as f64 / total as f64
    }
}
