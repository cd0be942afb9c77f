//! Configuration management for Sift tools.
//!
//! All Sift consumers share a single JSON configuration file at
//! `~/.sift/config.json`. Missing file or missing sections fall back to
//! defaults, so a fresh checkout runs without any setup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, ResultExt};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".sift"),
        |dirs| dirs.home_dir().join(".sift"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by every Sift consumer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Market/benchmark configuration
    #[serde(default)]
    pub market: MarketConfig,
}

impl Config {
    /// Load from the default path; a missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("reading config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .context(format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration to a path, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .context(format!("creating config directory {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).context(format!("writing config file {}", path.display()))?;
        Ok(())
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.market.index_symbol.trim().is_empty() {
            return Err(Error::Config("market.index_symbol must not be empty".into()));
        }
        match self.observability.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(Error::Config(format!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ))),
        }
    }
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Market Configuration
// ============================================================================

/// Market/benchmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Benchmark index symbol used for market-trend classification
    #[serde(default = "default_index_symbol")]
    pub index_symbol: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            index_symbol: default_index_symbol(),
        }
    }
}

fn default_index_symbol() -> String {
    // Shanghai Composite
    "sh000001".to_string()
}

// ============================================================================
// Tests
// ============================================================================
