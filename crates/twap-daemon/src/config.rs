//! Configuration file management.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use twap_oracle::EngineConfig;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "TWAPD_CONFIG";

/// Config file used when neither `--config` nor [`CONFIG_ENV`] is set.
pub const DEFAULT_CONFIG_FILE: &str = "twapd.toml";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Engine settings shared by every feed.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Poll loop settings.
    #[serde(default)]
    pub updater: UpdaterConfig,
    /// Snapshot storage.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// One entry per reference-rate feed.
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,
}

/// Poll loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Seconds between upstream polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Seconds without a fresh sample before a feed stops serving prices.
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold_secs: u64,
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one JSON snapshot per feed.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Write snapshots after every this many polls.
    #[serde(default = "default_snapshot_every_polls")]
    pub snapshot_every_polls: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// A reference-rate feed backed by a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Base asset symbol.
    pub base: String,
    /// Quote asset symbol.
    pub quote: String,
    /// File holding the current reference datum.
    pub source_file: PathBuf,
    /// TWAP interval logged after each poll.
    #[serde(default = "default_twap_interval")]
    pub twap_interval: u64,
}

impl FeedConfig {
    /// Feed name, `BASE/QUOTE`.
    pub fn name(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

// Default value functions

fn default_poll_interval() -> u64 {
    15
}

fn default_staleness_threshold() -> u64 {
    twap_feeds::circuit_breaker::STALENESS_THRESHOLD
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_snapshot_every_polls() -> u64 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_twap_interval() -> u64 {
    900
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            staleness_threshold_secs: default_staleness_threshold(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            snapshot_every_polls: default_snapshot_every_polls(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`, [`CONFIG_ENV`], or [`DEFAULT_CONFIG_FILE`],
    /// in that order.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path = Self::config_path(path);
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            Self::parse(&content).with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.engine.validate()?;
        anyhow::ensure!(
            self.updater.poll_interval_secs > 0,
            "updater.poll_interval_secs must be positive"
        );
        anyhow::ensure!(
            self.storage.snapshot_every_polls > 0,
            "storage.snapshot_every_polls must be positive"
        );
        let mut names: Vec<String> = self.feeds.iter().map(FeedConfig::name).collect();
        names.sort();
        if let Some(pair) = names.windows(2).find(|pair| pair[0] == pair[1]) {
            anyhow::bail!("feed {} is configured twice", pair[0]);
        }
        Ok(())
    }

    fn config_path(path: Option<&Path>) -> PathBuf {
        if let Some(path) = path {
            return path.to_path_buf();
        }
        // Check env var override next
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return PathBuf::from(path);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }
}
