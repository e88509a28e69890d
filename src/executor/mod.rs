//! Order execution.
//!
//! The trading state machine talks to one [`OrderExecutor`] and never cares
//! which implementation is behind it: the dry-run executor fills instantly at
//! the market-implied probability, the live executor takes the top of book on
//! the CLOB with a fill-or-kill order.

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::auth::AuthSession;
use crate::client::clob::{ClobClient, OrderRequest};
use crate::config::LiveConfig;
use crate::error::{BotError, Result};
use crate::types::{MarketSnapshot, PositionSide};

/// A filled open order.
#[derive(Debug, Clone)]
pub struct Fill {
    /// Price paid per share of the traded outcome token (YES for a long,
    /// NO for a short).
    pub price: Decimal,
    pub shares: Decimal,
    pub order_id: String,
}

/// Capability to open a position of `notional` dollars on one side of a
/// market.
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn execute(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        notional: Decimal,
    ) -> Result<Fill>;

    fn name(&self) -> &str;
}

/// Paper execution: immediate fill at the current market price.
pub struct DryRunExecutor;

#[async_trait]
impl OrderExecutor for DryRunExecutor {
    async fn execute(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        notional: Decimal,
    ) -> Result<Fill> {
        // The YES price is the quoted probability; a short buys the NO side
        // at its complement.
        let price = match side {
            PositionSide::Long => snapshot.polymarket_prob,
            PositionSide::Short => Decimal::ONE - snapshot.polymarket_prob,
        };
        if price <= Decimal::ZERO {
            return Err(BotError::Execution("degenerate fill price".to_string()));
        }

        let shares = notional / price;
        debug!(
            market_id = %snapshot.claim.market_id,
            ?side,
            %notional,
            %price,
            "dry-run fill"
        );
        Ok(Fill {
            price,
            shares,
            order_id: format!("dry-{}", uuid::Uuid::new_v4()),
        })
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}

/// Live execution against the CLOB.
///
/// Credentials are derived lazily on the first order: the wallet signs the
/// typed-data attestation once, and the resulting [`AuthSession`] lives here
/// for the rest of the run.
pub struct LiveExecutor {
    clob: ClobClient,
    live: LiveConfig,
    clob_url: String,
    session: RwLock<Option<AuthSession>>,
}

impl LiveExecutor {
    pub fn new(clob: ClobClient, clob_url: &str, live: LiveConfig) -> Self {
        Self {
            clob,
            live,
            clob_url: clob_url.to_string(),
            session: RwLock::new(None),
        }
    }

    async fn session(&self) -> Result<AuthSession> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        let session = AuthSession::establish(
            self.clob.fetcher_client(),
            &self.clob_url,
            &self.live.private_key,
            self.live.chain_id,
        )
        .await?;
        info!(address = session.address(), "CLOB auth session established");
        *guard = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl OrderExecutor for LiveExecutor {
    async fn execute(
        &self,
        snapshot: &MarketSnapshot,
        side: PositionSide,
        notional: Decimal,
    ) -> Result<Fill> {
        let session = self.session().await?;

        // Long buys the YES token, short buys the NO token.
        let token_id = match side {
            PositionSide::Long => &snapshot.yes_token_id,
            PositionSide::Short => &snapshot.no_token_id,
        };

        let book = self.clob.order_book(token_id).await?;
        // Top-of-book ask on the chosen token, both directions. For a short
        // this is ask(NO), which in practice is not exactly 1 - ask(YES).
        let ask = book
            .best_ask()
            .ok_or_else(|| BotError::Execution("no asks on book".to_string()))?;
        if ask <= Decimal::ZERO || ask >= Decimal::ONE {
            return Err(BotError::Execution(format!("unusable ask {}", ask)));
        }

        let shares = (notional / ask).round_dp(2);
        if shares <= Decimal::ZERO {
            return Err(BotError::Execution("order size rounds to zero".to_string()));
        }

        let order = OrderRequest::fok_buy(token_id, shares, ask);
        let order_id = self.clob.place_order(&session, &order).await?;

        info!(
            market_id = %snapshot.claim.market_id,
            ?side,
            %notional,
            %ask,
            %shares,
            order_id,
            "live order filled"
        );
        Ok(Fill { price: ask, shares, order_id })
    }

    fn name(&self) -> &str {
        "live"
    }
}
