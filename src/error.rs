//! Error types for the arbitrage engine.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BotError>;

/// All failure modes surfaced by the engine.
///
/// Parse rejections are deliberately *not* errors: a question that is not a
/// crypto price market is an expected outcome and the parser returns `None`.
#[derive(Debug, Error)]
pub enum BotError {
    /// Transport-level HTTP failure (connect, timeout, decode).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream returned a non-success status we don't handle specially.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Upstream returned 429. Callers back off instead of retrying.
    #[error("rate limited by upstream")]
    RateLimited,

    /// Upstream returned 401/403.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The spot oracle produced no quotes at all this cycle.
    #[error("spot prices unavailable")]
    PricesUnavailable,

    /// Credential derivation or request signing failed.
    #[error("auth error: {0}")]
    Auth(String),

    /// Order placement failed or was rejected.
    #[error("execution error: {0}")]
    Execution(String),

    /// The persisted state file exists but cannot be read back. Never
    /// overwritten; the process aborts instead.
    #[error("state file corrupt at {}: {reason}", .path.display())]
    StateCorruption { path: PathBuf, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BotError {
    /// True when a failed HTTP call may be retried within the same request.
    pub fn is_transient(&self) -> bool {
        match self {
            BotError::Http(e) => e.is_timeout() || e.is_connect(),
            BotError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
