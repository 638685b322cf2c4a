use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watcher task parameters
///
/// Watchers themselves never time out; `stop_timeout_ms` only bounds how long
/// callers using [`crate::utils::stop_with_timeout`] wait for a watcher to
/// report its terminal state.
///
/// # Example (TOML)
/// ```toml
/// [watcher]
/// stop_timeout_ms = 5000
/// trace_merges = false
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WatcherConfig {
    /// **Default**: 5000
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Log every merged change at trace level
    ///
    /// **Default**: false
    #[serde(default = "default_trace_merges")]
    pub trace_merges: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            stop_timeout_ms: default_stop_timeout_ms(),
            trace_merges: default_trace_merges(),
        }
    }
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.stop_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watcher.stop_timeout_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

const fn default_stop_timeout_ms() -> u64 {
    5000
}

const fn default_trace_merges() -> bool {
    false
}
