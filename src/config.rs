//! Configuration for the active series tracker
//!
//! Supports TOML with sensible defaults and environment variable overrides:
//!
//! ```toml
//! idle_timeout_secs = 600
//!
//! [custom_trackers]
//! api = '{job="api"}'
//! prod = '{env=~"prod-.*"}'
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::matchers::{CustomTrackersConfig, Matchers};

/// Tracker configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ActiveSeriesConfig {
    /// Seconds a series may go unobserved before it is considered inactive
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Custom trackers: name → label selector
    #[serde(default)]
    pub custom_trackers: CustomTrackersConfig,
}

// Default value functions
fn default_idle_timeout_secs() -> u64 {
    600
}

impl Default for ActiveSeriesConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            custom_trackers: CustomTrackersConfig::default(),
        }
    }
}

impl ActiveSeriesConfig {
    /// Parse configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with environment variable overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides
    ///
    /// An override that fails to parse is logged and skipped.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("ACTIVESET_IDLE_TIMEOUT_SECS") {
            match secs.parse() {
                Ok(parsed) => self.idle_timeout_secs = parsed,
                Err(_) => warn!(
                    value = %secs,
                    "ignoring unparseable ACTIVESET_IDLE_TIMEOUT_SECS"
                ),
            }
        }
        if let Ok(trackers) = std::env::var("ACTIVESET_CUSTOM_TRACKERS") {
            match trackers.parse() {
                Ok(parsed) => self.custom_trackers = parsed,
                Err(e) => warn!(
                    error = %e,
                    "ignoring unparseable ACTIVESET_CUSTOM_TRACKERS"
                ),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout_secs == 0 {
            return Err(Error::InvalidConfig(
                "idle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The idle timeout as a [`Duration`]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Compile the configured custom trackers into a matcher set
    pub fn build_matchers(&self) -> Result<Matchers> {
        Matchers::new(self.custom_trackers.clone())
    }
}
