//! Atomic JSON persistence for the trading state.
//!
//! One small document per cycle, written via write-to-temp-then-rename in the
//! same directory so concurrent readers always observe either the pre- or the
//! post-image. A file that exists but cannot be read back is state
//! corruption: it is never overwritten, the process aborts instead.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{BotError, Result};
use crate::types::BotState;

/// Paper-trading state file name.
pub const PAPER_STATE_FILE: &str = "bot-state.json";
/// Live-trading state file name.
pub const LIVE_STATE_FILE: &str = "real-bot-state.json";

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(dir: &Path, file_name: &str) -> Self {
        Self { path: dir.join(file_name) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the persisted state. `None` when no file exists yet; a file that
    /// cannot be parsed is [`BotError::StateCorruption`].
    pub fn load(&self) -> Result<Option<BotState>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let state = serde_json::from_str(&raw).map_err(|e| BotError::StateCorruption {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(state))
    }

    /// Persist the state atomically. The directory is created on first write.
    pub fn save(&self, state: &BotState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path)?;

        let cleanup = |e: std::io::Error| {
            let _ = fs::remove_file(&temp_path);
            BotError::Io(e)
        };
        file.write_all(json.as_bytes()).map_err(cleanup)?;
        file.sync_all().map_err(cleanup)?;

        fs::rename(&temp_path, &self.path).map_err(cleanup)?;
        debug!(path = %self.path.display(), "state persisted");
        Ok(())
    }
}
