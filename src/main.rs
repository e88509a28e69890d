//! Crypto price-target arbitrage bot.
//!
//! Scans a prediction market for crypto price claims, compares market prices
//! to model-implied probabilities, and trades the edge.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use polyquant::client::{ClobClient, GammaClient, HttpFetcher};
use polyquant::config::Config;
use polyquant::error::BotError;
use polyquant::executor::{DryRunExecutor, LiveExecutor, OrderExecutor};
use polyquant::pipeline::OpportunityPipeline;
use polyquant::providers::{OptionsClient, SpotPriceClient};
use polyquant::store::{StateStore, LIVE_STATE_FILE, PAPER_STATE_FILE};
use polyquant::trader::TradingStateMachine;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "polyquant")]
#[command(about = "Quantitative arbitrage bot for crypto price-target prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading loop
    Run {
        /// Force dry-run mode regardless of config
        #[arg(long)]
        dry_run: bool,
    },
    /// Scan and print the current ranked opportunities
    Scan {
        /// Number of opportunities to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Print the persisted bot status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    let result = match cli.command {
        Commands::Run { dry_run } => run_bot(config, dry_run).await,
        Commands::Scan { limit } => scan(config, limit).await,
        Commands::Status => status(config),
    };

    // A corrupt state file must never be overwritten; bail out loudly.
    if let Err(e) = &result {
        if let Some(BotError::StateCorruption { path, reason }) = e.downcast_ref::<BotError>() {
            eprintln!(
                "state file {} is corrupt ({}); refusing to start",
                path.display(),
                reason
            );
            std::process::exit(2);
        }
    }
    result
}

fn build_pipeline(config: &Config, fetcher: &HttpFetcher) -> OpportunityPipeline {
    OpportunityPipeline::new(
        GammaClient::new(&config.endpoints.gamma_url, fetcher.clone()),
        SpotPriceClient::new(&config.endpoints.spot_url, fetcher.clone()),
        OptionsClient::new(&config.endpoints.options_url, fetcher.clone()),
        config.trading.vol_mode,
    )
}

async fn run_bot(config: Config, force_dry_run: bool) -> anyhow::Result<()> {
    let dry_run = force_dry_run || config.trading.dry_run;
    if dry_run {
        tracing::info!("running in dry-run mode, orders are simulated");
    } else {
        tracing::warn!("running in LIVE mode, orders will be placed");
    }

    let fetcher = HttpFetcher::new()?;
    let pipeline = build_pipeline(&config, &fetcher);

    let executor: Arc<dyn OrderExecutor> = if dry_run {
        Arc::new(DryRunExecutor)
    } else {
        let live = config
            .live
            .clone()
            .ok_or_else(|| anyhow::anyhow!("live mode requires a [live] config section"))?;
        let clob = ClobClient::new(&config.endpoints.clob_url, fetcher.clone());
        Arc::new(LiveExecutor::new(clob, &config.endpoints.clob_url, live))
    };

    let state_file = if dry_run { PAPER_STATE_FILE } else { LIVE_STATE_FILE };
    let store = StateStore::new(&config.data.dir, state_file);

    let mut trading_config = config.trading.clone();
    trading_config.dry_run = dry_run;

    let mut machine = TradingStateMachine::new(trading_config, pipeline, store, executor)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    machine.run(shutdown_rx).await?;
    Ok(())
}

async fn scan(config: Config, limit: usize) -> anyhow::Result<()> {
    let fetcher = HttpFetcher::new()?;
    let pipeline = build_pipeline(&config, &fetcher);
    let opportunities = pipeline.opportunities(limit).await?;

    println!("\nTop {} opportunities:\n", opportunities.len());
    println!(
        "{:<48} {:>7} {:>7} {:>8} {:>8} {:>7} {:>6}",
        "Question", "Market", "Model", "EdgeZ", "EdgeD", "Signal", "Conf"
    );
    println!("{}", "-".repeat(96));

    for opp in &opportunities {
        let question: String = opp.snapshot.claim.question.chars().take(45).collect();
        println!(
            "{:<48} {:>6.1}% {:>6.1}% {:>+8.3} {:>8} {:>7} {:>6}",
            question,
            opp.snapshot.prob_f64() * 100.0,
            opp.effective_model_prob() * 100.0,
            opp.edge_z,
            opp.edge_delta
                .map(|e| format!("{:+.3}", e))
                .unwrap_or_else(|| "-".to_string()),
            format!("{:?}", opp.signal).to_lowercase(),
            format!("{:?}", opp.confidence).to_lowercase(),
        );
    }
    Ok(())
}

fn status(config: Config) -> anyhow::Result<()> {
    let mut found = false;
    for (label, file) in [("paper", PAPER_STATE_FILE), ("live", LIVE_STATE_FILE)] {
        let store = StateStore::new(&config.data.dir, file);
        let Some(state) = store.load()? else { continue };
        found = true;

        println!("\n[{}] {}", label, store.path().display());
        println!("  running:        {}", state.is_running);
        println!("  balance:        ${:.2}", state.current_balance);
        println!("  realized pnl:   ${:.2}", state.total_realized_pnl);
        println!(
            "  record:         {}W / {}L ({:.0}%)",
            state.win_count,
            state.loss_count,
            state.win_rate() * 100.0
        );
        println!("  open positions: {}", state.open_positions.len());
        for position in state.open_positions.values() {
            println!(
                "    {} {} {:?} @ {} notional ${} edge {:+.3} uPnL ${:.2}",
                position.market_id,
                position.symbol,
                position.side,
                position.entry_price,
                position.notional,
                position.current_edge,
                position.unrealized_pnl
            );
        }
        println!("  trades:         {}", state.trades.len());
        println!("  last update:    {}", state.last_update);
        if let Some(err) = &state.last_error {
            println!("  last error:     {}", err);
        }
    }

    if !found {
        println!("no persisted state under {}", config.data.dir.display());
    }
    Ok(())
}
