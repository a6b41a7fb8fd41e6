//! Configuration management
//!
//! Default config location: ./esquery.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub datasource: DatasourceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceConfig {
    /// Base URL of the engine
    #[serde(default = "default_url")]
    pub url: String,
    /// Index name or pattern searched by every panel
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Minimum interval for every query, e.g. `10s` or `>1m`
    pub time_interval: Option<String>,
    pub max_concurrent_shard_requests: Option<i64>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_index() -> String {
    "*".to_string()
}

fn default_time_field() -> String {
    "@timestamp".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            time_field: default_time_field(),
            time_interval: None,
            max_concurrent_shard_requests: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

impl Config {
    /// Load config from file path, or create default
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = fs::read_to_string(config_path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Config::default();
            // Try to save default config
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            let _ = config.save(config_path);
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}
