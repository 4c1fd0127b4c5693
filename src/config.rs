//! Configuration management
//!
//! This module handles loading and managing configuration from:
//! - Command-line arguments (applied by the CLI on top of the loaded file)
//! - Environment variables
//! - Configuration files (TOML)
//! - Defaults

use crate::error::{Error, Result};
use crate::trace::TraceOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,

    #[serde(default)]
    pub trace: TraceOptions,

    #[serde(default)]
    pub blockchair: BlockchairConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Default settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultConfig {
    #[serde(default = "default_source")]
    pub source: String,
}

/// Blockchair API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockchairConfig {
    /// API root including the chain, e.g. `https://api.blockchair.com/bitcoin`
    pub base_url: String,

    /// Blockchair API key
    pub api_key: Option<String>,

    /// Maximum number of retries for API requests
    pub max_retries: u32,

    /// First retry delay; doubles on each further attempt
    pub retry_delay_ms: u64,

    /// Upper bound for a single retry delay
    pub max_backoff_ms: u64,

    /// Per-request timeout
    pub timeout_secs: u64,

    /// Transaction ids requested per address dashboard
    pub address_tx_limit: usize,

    /// Transactions resolved per address
    pub transactions_per_address: usize,

    /// Base units per displayed unit (satoshi per BTC)
    pub unit_divisor: f64,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    #[serde(default)]
    pub enabled: bool,

    /// Cache directory
    pub directory: Option<PathBuf>,

    /// Cache TTL in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_source() -> String {
    "mock".to_string()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

// Default implementations

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
        }
    }
}

impl Default for BlockchairConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.blockchair.com/bitcoin".to_string(),
            api_key: None,
            max_retries: 3,
            retry_delay_ms: 5_000,
            max_backoff_ms: 60_000,
            timeout_secs: 30,
            address_tx_limit: 50,
            transactions_per_address: 5,
            unit_divisor: 100_000_000.0,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read config file {:?}: {}", path, e)))?;

        toml::from_str(&contents).map_err(|e| Error::ConfigParse {
            file: path,
            message: e.to_string(),
        })
    }

    /// Load configuration from default locations
    ///
    /// Searches in order:
    /// 1. ./config.toml
    /// 2. ~/.flow-tracer/config.toml
    /// 3. /etc/flow-tracer/config.toml
    pub fn load() -> Result<Self> {
        let mut paths = vec![PathBuf::from("config.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".flow-tracer").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/flow-tracer/config.toml"));

        for path in paths {
            if path.exists() {
                tracing::info!("Loading config from {:?}", path);
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Blockchair API key from config or environment; the API works without one
    pub fn blockchair_api_key(&self) -> Option<String> {
        self.blockchair
            .api_key
            .clone()
            .or_else(|| std::env::var("BLOCKCHAIR_API_KEY").ok())
            .filter(|key| !key.is_empty())
    }

    /// Get cache directory with fallback to default
    pub fn cache_directory(&self) -> PathBuf {
        self.cache.directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("flow-tracer"))
                .unwrap_or_else(|| PathBuf::from("/tmp/flow-tracer-cache"))
        })
    }
}
