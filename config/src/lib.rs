//! Configuration loading for Ballast.
//!
//! The governance layer is configured once at startup from a TOML file
//! and never mutates the result. Every section is optional; a missing
//! file yields defaults (empty budget table, no rate-limited channels,
//! default resource ceilings), so an unconfigured session runs with the
//! layer effectively failing open.
//!
//! ```toml
//! [budgets]
//! "audio-chunk" = { threshold_ms = 50 }
//! "ai-roundtrip" = { threshold_ms = 2000 }
//!
//! [channels."ai.chat"]
//! max_requests = 10
//! window_ms = 60000
//!
//! [resources]
//! max_cpu_percent = 85.0
//! max_memory_bytes = 1073741824
//! sample_interval_ms = 5000
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use serde::Deserialize;
use thiserror::Error;

use ballast_types::{Budget, BudgetTable, RateLimitSettings, RateLimitsError, ResourceLimits};

/// Environment variable that overrides the default config path.
pub const CONFIG_PATH_ENV: &str = "BALLAST_CONFIG";

const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 5_000;
const DEFAULT_CHANNEL_WINDOW_MS: u64 = 60_000;
const DEFAULT_CHANNEL_MAX_REQUESTS: usize = 10;
const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid [channels.\"{channel}\"] settings")]
    Channel {
        channel: String,
        #[source]
        source: RateLimitsError,
    },
}

#[derive(Debug, Default, Deserialize)]
pub struct BallastConfig {
    /// Latency budgets keyed by metric name.
    #[serde(default)]
    pub budgets: BTreeMap<String, BudgetEntry>,
    /// Rate-limit settings keyed by channel name.
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelEntry>,
    pub resources: Option<ResourceEntry>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BudgetEntry {
    pub threshold_ms: u64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ChannelEntry {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

const fn default_max_requests() -> usize {
    DEFAULT_CHANNEL_MAX_REQUESTS
}
const fn default_window_ms() -> u64 {
    DEFAULT_CHANNEL_WINDOW_MS
}
const fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
const fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ResourceEntry {
    pub max_cpu_percent: Option<f64>,
    pub max_memory_bytes: Option<u64>,
    pub sample_interval_ms: Option<u64>,
}

/// Default config location: `~/.ballast/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    dirs::home_dir().map(|home| home.join(".ballast").join("config.toml"))
}

impl BallastConfig {
    /// Load from the default path. A missing file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::warn!("no home directory; using default governance config");
                Ok(Self::default())
            }
        }
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file; using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(
            budgets = config.budgets.len(),
            channels = config.channels.len(),
            "loaded governance config"
        );
        Ok(config)
    }

    /// Domain budget table for the monitor.
    #[must_use]
    pub fn budget_table(&self) -> BudgetTable {
        self.budgets
            .iter()
            .map(|(name, entry)| (name.clone(), Budget::from_millis(entry.threshold_ms)))
            .collect()
    }

    /// Resource ceilings for the monitor, defaults where unspecified.
    #[must_use]
    pub fn resource_limits(&self) -> ResourceLimits {
        let defaults = ResourceLimits::default();
        match &self.resources {
            Some(entry) => ResourceLimits {
                max_cpu_percent: entry.max_cpu_percent.unwrap_or(defaults.max_cpu_percent),
                max_memory_bytes: entry.max_memory_bytes.unwrap_or(defaults.max_memory_bytes),
            },
            None => defaults,
        }
    }

    /// Cadence for periodic resource snapshots.
    #[must_use]
    pub fn sample_interval(&self) -> Duration {
        let ms = self
            .resources
            .as_ref()
            .and_then(|entry| entry.sample_interval_ms)
            .unwrap_or(DEFAULT_SAMPLE_INTERVAL_MS);
        Duration::from_millis(ms)
    }

    /// Validated settings for one configured channel, or `None` if the
    /// channel has no `[channels]` entry.
    pub fn channel_settings(&self, channel: &str) -> Result<Option<RateLimitSettings>, ConfigError> {
        let Some(entry) = self.channels.get(channel) else {
            return Ok(None);
        };
        let settings = RateLimitSettings::new(
            entry.max_requests,
            Duration::from_millis(entry.window_ms),
            Duration::from_millis(entry.base_delay_ms),
            Duration::from_millis(entry.max_delay_ms),
        )
        .map_err(|source| ConfigError::Channel {
            channel: channel.to_string(),
            source,
        })?;
        Ok(Some(settings))
    }

    /// Names of all channels with explicit rate-limit settings.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.keys().map(String::as_str)
    }
}
