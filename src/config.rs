//! Configuration loading and defaults.
//!
//! All configuration is a single TOML document loaded at startup. Every
//! section has serde defaults so a missing file yields a runnable dry-run
//! setup.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub endpoints: EndpointsConfig,
    #[serde(default)]
    pub trading: BotConfig,
    #[serde(default)]
    pub data: DataConfig,
    /// Wallet credentials; required only when `trading.dry_run = false`.
    pub live: Option<LiveConfig>,
}

impl Config {
    /// Load configuration from a TOML file. A missing file is not an error:
    /// defaults describe a fully functional dry-run setup.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            tracing::info!("config file {} not found, using defaults", path);
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| BotError::Config(format!("{}: {}", path, e)))
    }
}

/// Upstream endpoint base URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    #[serde(default = "default_options_url")]
    pub options_url: String,
    #[serde(default = "default_spot_url")]
    pub spot_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            clob_url: default_clob_url(),
            options_url: default_options_url(),
            spot_url: default_spot_url(),
        }
    }
}

fn default_gamma_url() -> String {
    "https://gamma-api.polymarket.com".to_string()
}

fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}

fn default_options_url() -> String {
    "https://www.deribit.com/api/v2".to_string()
}

fn default_spot_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

/// Where persisted state lives.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { dir: default_data_dir() }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Wallet and chain settings for the live executor.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub private_key: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub funder_address: Option<String>,
}

fn default_chain_id() -> u64 {
    137
}

/// How the volatility used for z-score estimates is sourced for symbols the
/// options exchange does not list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolMode {
    /// Hard-coded per-symbol default volatility.
    Default,
    /// Annualized realized volatility from the oracle's daily series.
    Realized,
}

/// Trading parameters. Immutable for the lifetime of a run; a snapshot is
/// persisted inside the bot state for the status readout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
    /// Entry gate: minimum absolute edge.
    #[serde(default = "default_min_edge_to_enter")]
    pub min_edge_to_enter: f64,
    /// Exit rule: close once absolute edge drops below this.
    #[serde(default = "default_max_edge_to_exit")]
    pub max_edge_to_exit: f64,
    #[serde(default = "default_base_position_size")]
    pub base_position_size: Decimal,
    /// Dollars of extra size per unit of absolute edge.
    #[serde(default = "default_edge_multiplier")]
    pub edge_multiplier: Decimal,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    /// Hard cap on the sum of open notionals.
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: Decimal,
    /// Tick period in seconds. 60 is the sensible floor.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Minimum days to expiry to open a position.
    #[serde(default = "default_min_time_to_expiry_days")]
    pub min_time_to_expiry_days: f64,
    #[serde(default = "default_max_positions_per_market")]
    pub max_positions_per_market: u32,
    /// How many opportunities to request per cycle.
    #[serde(default = "default_opportunity_limit")]
    pub opportunity_limit: usize,
    #[serde(default = "default_vol_mode")]
    pub vol_mode: VolMode,
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            starting_balance: default_starting_balance(),
            min_edge_to_enter: default_min_edge_to_enter(),
            max_edge_to_exit: default_max_edge_to_exit(),
            base_position_size: default_base_position_size(),
            edge_multiplier: default_edge_multiplier(),
            max_position_size: default_max_position_size(),
            max_total_exposure: default_max_total_exposure(),
            poll_interval_secs: default_poll_interval_secs(),
            min_time_to_expiry_days: default_min_time_to_expiry_days(),
            max_positions_per_market: default_max_positions_per_market(),
            opportunity_limit: default_opportunity_limit(),
            vol_mode: default_vol_mode(),
            dry_run: default_dry_run(),
        }
    }
}

fn default_starting_balance() -> Decimal {
    dec!(1000)
}

fn default_min_edge_to_enter() -> f64 {
    0.05
}

fn default_max_edge_to_exit() -> f64 {
    0.05
}

fn default_base_position_size() -> Decimal {
    dec!(25)
}

fn default_edge_multiplier() -> Decimal {
    dec!(500)
}

fn default_max_position_size() -> Decimal {
    dec!(100)
}

fn default_max_total_exposure() -> Decimal {
    dec!(500)
}

fn default_poll_interval_secs() -> u64 {
    120
}

fn default_min_time_to_expiry_days() -> f64 {
    1.0
}

fn default_max_positions_per_market() -> u32 {
    1
}

fn default_opportunity_limit() -> usize {
    20
}

fn default_vol_mode() -> VolMode {
    VolMode::Default
}

fn default_dry_run() -> bool {
    true
}
