//! The trading state machine.
//!
//! Single mutator of [`BotState`]. Runs one cycle per tick: refresh open
//! positions from the fresh opportunity list, evaluate exits, evaluate
//! entries highest-edge-first under the entry gates, then persist a
//! consistent snapshot. Cycles never overlap; a cycle that runs long simply
//! causes the next tick to be skipped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::executor::{Fill, OrderExecutor};
use crate::pipeline::OpportunityPipeline;
use crate::store::StateStore;
use crate::types::{
    BetType, BotState, CloseReason, Direction, Opportunity, Position, PositionSide,
    PositionStatus, Trade, TradeAction,
};

pub struct TradingStateMachine {
    config: BotConfig,
    pipeline: OpportunityPipeline,
    store: StateStore,
    executor: Arc<dyn OrderExecutor>,
    state: BotState,
}

impl TradingStateMachine {
    /// Load persisted state (or start fresh) and bind the run's config.
    pub fn new(
        config: BotConfig,
        pipeline: OpportunityPipeline,
        store: StateStore,
        executor: Arc<dyn OrderExecutor>,
    ) -> Result<Self> {
        let state = match store.load()? {
            Some(mut state) => {
                info!(
                    balance = %state.current_balance,
                    open = state.open_positions.len(),
                    "resuming from persisted state"
                );
                state.config = config.clone();
                state
            }
            None => BotState::new(config.clone()),
        };

        Ok(Self { config, pipeline, store, executor, state })
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    /// Tick loop. Runs until `shutdown` fires, then flushes a final snapshot.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            executor = self.executor.name(),
            poll_secs = self.config.poll_interval_secs,
            "trading loop starting"
        );
        self.state.is_running = true;
        self.persist()?;

        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let mut interval = tokio::time::interval(poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut backoff_next = false;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if backoff_next {
                        // One doubled interval after a rate limit, then back
                        // to the normal cadence.
                        backoff_next = false;
                        tokio::select! {
                            _ = tokio::time::sleep(poll) => {}
                            _ = shutdown.changed() => break,
                        }
                    }

                    match self.run_cycle().await {
                        Ok(()) => {}
                        Err(BotError::RateLimited) => {
                            warn!("rate limited upstream, backing off one cycle");
                            self.state.last_error = Some("rate-limited".to_string());
                            backoff_next = true;
                            if let Err(e) = self.persist() {
                                error!(error = %e, "persist after rate limit failed");
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "cycle failed");
                            self.state.last_error = Some(e.to_string());
                            if let Err(e) = self.persist() {
                                error!(error = %e, "persist after cycle failure failed");
                            }
                        }
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("trading loop stopping");
        self.state.is_running = false;
        self.persist()
    }

    async fn run_cycle(&mut self) -> Result<()> {
        let opportunities = self
            .pipeline
            .opportunities(self.config.opportunity_limit)
            .await?;
        self.cycle_with(opportunities).await
    }

    /// One full cycle over an already-fetched opportunity list. Ordering is
    /// fixed: refresh, exits, entries, persist.
    pub async fn cycle_with(&mut self, opportunities: Vec<Opportunity>) -> Result<()> {
        let now = Utc::now();

        if opportunities.is_empty() {
            debug!("no opportunities this cycle");
            self.state.last_update = now;
            return self.persist();
        }

        self.refresh_positions(&opportunities);
        self.exit_phase(&opportunities, now);
        self.entry_phase(&opportunities, now).await;

        self.state.last_error = None;
        self.state.last_update = now;
        if !self.config.dry_run {
            self.state.max_exposure = Some(self.config.max_total_exposure);
            self.state.current_exposure = Some(self.state.total_open_notional());
        }
        self.check_invariants();
        self.persist()
    }

    /// Mark every open position against the fresh opportunity list. Markets
    /// that disappeared keep their last known price and edge.
    fn refresh_positions(&mut self, opportunities: &[Opportunity]) {
        let by_market = index_by_market(opportunities);
        for position in self.state.open_positions.values_mut() {
            if let Some(opp) = by_market.get(position.market_id.as_str()) {
                position.mark(opp.snapshot.polymarket_prob, opp.effective_edge());
            }
        }
    }

    /// Close positions whose edge converged, flipped, or whose market is gone
    /// past expiry. Iterates over a snapshot of the open set.
    fn exit_phase(&mut self, opportunities: &[Opportunity], now: DateTime<Utc>) {
        let by_market = index_by_market(opportunities);
        let market_ids: Vec<String> = self.state.open_positions.keys().cloned().collect();

        for market_id in market_ids {
            let Some(position) = self.state.open_positions.get(&market_id) else {
                continue;
            };

            if !by_market.contains_key(market_id.as_str()) {
                if position.expiry <= now {
                    let price = position.current_price;
                    self.close_position(&market_id, price, CloseReason::Expired, now);
                }
                continue;
            }

            let edge = position.current_edge;
            if edge.abs() < self.config.max_edge_to_exit {
                let price = position.current_price;
                self.close_position(&market_id, price, CloseReason::EdgeAligned, now);
            } else if edge_flipped(position.side, edge) && edge.abs() >= self.config.min_edge_to_enter
            {
                let price = position.current_price;
                self.close_position(&market_id, price, CloseReason::EdgeAligned, now);
            }
        }
    }

    /// Walk the ranked opportunities and open whatever passes every gate.
    async fn entry_phase(&mut self, opportunities: &[Opportunity], now: DateTime<Utc>) {
        for opp in opportunities {
            let claim = &opp.snapshot.claim;
            let market_prob = opp.snapshot.prob_f64();

            // Resolved-market guard.
            if market_prob <= 0.01 || market_prob >= 0.99 {
                continue;
            }

            // A one-touch claim whose target was already touched pays out
            // regardless; there is nothing left to trade.
            if claim.bet_type == BetType::OneTouch {
                let touched = match claim.direction {
                    Direction::Above => opp.spot.price >= claim.target_price,
                    Direction::Below => opp.spot.price <= claim.target_price,
                };
                if touched {
                    continue;
                }
            }

            // Model-market agreement guard: both near-certain means the
            // residual edge is noise, not signal.
            let model_prob = opp.effective_model_prob();
            if (model_prob > 0.90 && market_prob > 0.90)
                || (model_prob < 0.10 && market_prob < 0.10)
            {
                continue;
            }

            let edge = opp.effective_edge();
            if edge.abs() < self.config.min_edge_to_enter {
                continue;
            }

            if claim.days_to_expiry(now) < self.config.min_time_to_expiry_days {
                continue;
            }

            if self.state.open_positions.contains_key(&claim.market_id) {
                continue;
            }

            let remaining_exposure =
                self.config.max_total_exposure - self.state.total_open_notional();
            if remaining_exposure <= Decimal::ZERO {
                continue;
            }

            let edge_abs = Decimal::try_from(edge.abs()).unwrap_or(Decimal::ZERO);
            let size = (self.config.base_position_size + edge_abs * self.config.edge_multiplier)
                .min(self.config.max_position_size)
                .min(remaining_exposure)
                .round_dp(2);
            if size <= Decimal::ZERO {
                continue;
            }
            if size > self.state.current_balance {
                continue;
            }

            // Positive edge: the market is overpriced relative to the model,
            // so short it. Negative edge: long.
            let side = if edge > 0.0 { PositionSide::Short } else { PositionSide::Long };

            match self.executor.execute(&opp.snapshot, side, size).await {
                Ok(fill) => self.open_position(opp, side, size, fill, now),
                Err(e) => {
                    warn!(
                        market_id = %claim.market_id,
                        error = %e,
                        "order submission failed, skipping"
                    );
                }
            }
        }
    }

    fn open_position(
        &mut self,
        opp: &Opportunity,
        side: PositionSide,
        notional: Decimal,
        fill: Fill,
        now: DateTime<Utc>,
    ) {
        let claim = &opp.snapshot.claim;
        let edge = opp.effective_edge();
        let shares = fill.shares;

        // The fill is priced in the traded token; store the YES-frame price.
        let entry_price = match side {
            PositionSide::Long => fill.price,
            PositionSide::Short => Decimal::ONE - fill.price,
        };

        let position = Position {
            id: uuid::Uuid::new_v4().to_string(),
            market_id: claim.market_id.clone(),
            symbol: claim.symbol.clone(),
            target_price: claim.target_price,
            direction: claim.direction,
            bet_type: claim.bet_type,
            expiry: claim.expiry,
            side,
            entry_price,
            notional,
            shares,
            entry_edge: edge,
            entry_time: now,
            current_price: entry_price,
            current_edge: edge,
            unrealized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            close_reason: None,
            close_price: None,
            close_time: None,
            realized_pnl: None,
        };

        info!(
            market_id = %claim.market_id,
            ?side,
            %notional,
            %entry_price,
            %shares,
            edge,
            order_id = %fill.order_id,
            "opened position"
        );

        self.state.current_balance -= notional;
        self.state.trades.push(Trade {
            id: uuid::Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            market_id: claim.market_id.clone(),
            timestamp: now,
            action: TradeAction::Open,
            side,
            price: entry_price,
            notional,
            shares,
            edge,
            zscore_prob: opp.zscore_estimate.probability,
            delta_prob: opp.delta_estimate.as_ref().map(|e| e.probability),
            spot_at_trade: opp.spot.price,
            pnl: None,
        });
        self.state
            .open_positions
            .insert(claim.market_id.clone(), position);
    }

    /// Settle one open position at a YES-frame price. At most one close per
    /// position: the entry is removed from the open set first.
    fn close_position(
        &mut self,
        market_id: &str,
        close_price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) {
        let Some(mut position) = self.state.open_positions.remove(market_id) else {
            return;
        };

        let pnl = position.pnl_at(close_price);
        self.state.current_balance += position.notional + pnl;
        self.state.total_realized_pnl += pnl;
        if pnl > Decimal::ZERO {
            self.state.win_count += 1;
        } else {
            self.state.loss_count += 1;
        }

        position.status = match reason {
            CloseReason::Expired => PositionStatus::Expired,
            _ => PositionStatus::Closed,
        };
        position.close_reason = Some(reason);
        position.close_price = Some(close_price);
        position.close_time = Some(now);
        position.realized_pnl = Some(pnl);
        position.current_price = close_price;
        position.unrealized_pnl = Decimal::ZERO;

        info!(
            market_id,
            ?reason,
            %close_price,
            %pnl,
            balance = %self.state.current_balance,
            "closed position"
        );

        // The model probability implied at the last refresh.
        let model_prob = close_price.to_f64().unwrap_or(0.0) - position.current_edge;
        self.state.trades.push(Trade {
            id: uuid::Uuid::new_v4().to_string(),
            position_id: position.id.clone(),
            market_id: market_id.to_string(),
            timestamp: now,
            action: TradeAction::Close,
            side: position.side,
            price: close_price,
            notional: position.notional,
            shares: position.shares,
            edge: position.current_edge,
            zscore_prob: model_prob,
            delta_prob: None,
            spot_at_trade: 0.0,
            pnl: Some(pnl),
        });
        self.state.closed_positions.push(position);
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.state)
    }

    /// Safety invariants that must hold after every persisted cycle.
    fn check_invariants(&self) {
        let state = &self.state;

        let total_open = state.total_open_notional();
        if total_open > self.config.max_total_exposure {
            error!(%total_open, "invariant violated: exposure above cap");
            debug_assert!(false, "exposure above cap");
        }
        if state.current_balance < Decimal::ZERO {
            error!(balance = %state.current_balance, "invariant violated: negative balance");
            debug_assert!(false, "negative balance");
        }

        let conserved = state.current_balance + total_open;
        let expected = state.starting_balance + state.total_realized_pnl;
        if conserved != expected {
            error!(%conserved, %expected, "invariant violated: balance conservation");
            debug_assert!(false, "balance conservation");
        }

        for position in state.open_positions.values() {
            if position.notional > self.config.max_position_size {
                error!(market_id = %position.market_id, "invariant violated: oversized position");
                debug_assert!(false, "oversized position");
            }
            let side_ok = match position.side {
                PositionSide::Short => position.entry_edge > 0.0,
                PositionSide::Long => position.entry_edge < 0.0,
            };
            if !side_ok {
                error!(market_id = %position.market_id, "invariant violated: side vs entry edge");
                debug_assert!(false, "side vs entry edge");
            }
        }
    }
}

fn index_by_market(opportunities: &[Opportunity]) -> HashMap<&str, &Opportunity> {
    opportunities
        .iter()
        .map(|o| (o.snapshot.claim.market_id.as_str(), o))
        .collect()
}

/// An edge whose sign now argues for the opposite side of this position.
fn edge_flipped(side: PositionSide, current_edge: f64) -> bool {
    match side {
        PositionSide::Short => current_edge < 0.0,
        PositionSide::Long => current_edge > 0.0,
    }
}
