//! Configuration System
//!
//! Layered scheduler configuration: built-in defaults, the user-level config file,
//! an explicit file supplied by the host, then `TRACKSCHED_*` environment overrides.

use crate::error::{SchedulerError, SchedulerResult};
use crate::logging::LoggingConfig;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "TRACKSCHED";
const MAX_INTER_ITEM_DELAY_MS: u64 = 60_000;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between two resolver invocations (milliseconds)
    #[serde(default = "default_inter_item_delay_ms")]
    pub inter_item_delay_ms: u64,

    /// Lookahead used by queue contexts registered without an explicit one
    #[serde(default)]
    pub default_playback_lookahead: usize,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_inter_item_delay_ms() -> u64 {
    150
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: default_inter_item_delay_ms(),
            default_playback_lookahead: 0,
            logging: LoggingConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn inter_item_delay(&self) -> Duration {
        Duration::from_millis(self.inter_item_delay_ms)
    }

    pub fn with_inter_item_delay(mut self, delay: Duration) -> Self {
        self.inter_item_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Validate the entire configuration, reporting every problem found.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.inter_item_delay_ms > MAX_INTER_ITEM_DELAY_MS {
            errors.push(format!(
                "inter_item_delay_ms {} exceeds maximum of {}",
                self.inter_item_delay_ms, MAX_INTER_ITEM_DELAY_MS
            ));
        }

        if let Err(logging_errors) = self.logging.validate() {
            errors.extend(logging_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads [`SchedulerConfig`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Path to the user-level config file, e.g. `~/.config/tracksched/config.toml`.
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "tracksched")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load defaults, global file, `explicit` (required when given), then environment.
    pub fn load(explicit: Option<&Path>) -> SchedulerResult<SchedulerConfig> {
        let mut builder = Self::builder_with_defaults()?;

        if let Some(global) = Self::global_config_path() {
            if global.exists() {
                debug!(config_path = %global.display(), "Loading global scheduler config");
                builder = builder.add_source(File::from(global).required(false));
            }
        }

        if let Some(path) = explicit {
            debug!(config_path = %path.display(), "Loading explicit scheduler config");
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: SchedulerConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            SchedulerError::Config(format!(
                "Configuration validation failed:\n{}",
                errors.join("\n")
            ))
        })?;
        Ok(config)
    }

    fn builder_with_defaults() -> SchedulerResult<ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("inter_item_delay_ms", default_inter_item_delay_ms())?
            .set_default("default_playback_lookahead", 0u64)?)
    }
}
