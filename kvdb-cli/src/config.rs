use std::path::PathBuf;
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};

/// Default Unix-socket endpoint, matching `original_source/TTDB.py`'s
/// `--socket` default.
pub const DEFAULT_SOCKET: &str = "./ttdb_socket";
/// Default purge period in seconds, matching `TTDB.py`'s `--pp` default.
pub const DEFAULT_PURGE_PERIOD_SECS: u64 = 20;
pub const DEFAULT_PROMPT: &str = "kvdb";

/// Persisted + CLI-overridable configuration, `confy`-backed (teacher idiom:
/// `kvcli::server::config::ConfigLoad`). Only the two knobs spec.md §6 names
/// are modeled — `socket` and `purge_period` — plus a client-side `prompt`
/// used only by the REPL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLoad {
    /// Location of the Unix socket the server binds and the client connects to.
    pub socket: PathBuf,

    /// Minimum number of seconds between successive purge sweeps.
    pub purge_period_secs: u64,

    /// Client REPL prompt text.
    pub prompt: Option<String>,

    /// Log level string (`trace`/`debug`/`info`/`warn`/`error`).
    pub log_level: String,
}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad {
            socket: PathBuf::from(DEFAULT_SOCKET),
            purge_period_secs: DEFAULT_PURGE_PERIOD_SECS,
            prompt: Some(DEFAULT_PROMPT.to_string()),
            log_level: "info".to_string(),
        }
    }
}

impl ConfigLoad {
    /// Loads the persisted `confy` configuration for `app_name`, falling
    /// back to [`ConfigLoad::default`] if none has ever been saved. A
    /// corrupt config file is reported but not fatal — the defaults are
    /// always a safe fallback.
    pub fn load(app_name: &str) -> Self {
        match confy::load(app_name, None) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("failed to load config for {app_name}, using defaults: {err}");
                ConfigLoad::default()
            }
        }
    }

    pub fn purge_period(&self) -> Duration {
        Duration::from_secs(self.purge_period_secs)
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }
}
