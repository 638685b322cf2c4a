use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::Error;
use crate::Result;

/// Configuration of the in-memory change feed ([`crate::ChangeHub`])
///
/// # Example (TOML)
/// ```toml
/// [feed]
/// registry_capacity = 64
/// ```
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedConfig {
    /// Initial capacity of the subscriber registries
    ///
    /// One entry exists per watched collection and per watched document.
    /// Sizing it close to the expected number of followed documents avoids
    /// rehashing while watchers start.
    ///
    /// **Default**: 64
    #[serde(default = "default_registry_capacity")]
    pub registry_capacity: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            registry_capacity: default_registry_capacity(),
        }
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<()> {
        if self.registry_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "feed.registry_capacity must be greater than 0".into(),
            )));
        }

        if self.registry_capacity > 1_000_000 {
            warn!(
                "feed.registry_capacity ({}) is very large and is allocated up front",
                self.registry_capacity
            );
        }

        Ok(())
    }
}

const fn default_registry_capacity() -> usize {
    64
}
