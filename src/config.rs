//! Configuration file parser for ~/.config/feedling/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Every field carries a serde default, so any subset of keys may be set.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level application configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file path. `None` resolves to the config directory.
    pub database_path: Option<String>,

    /// User-Agent sent with every feed request.
    pub user_agent: String,

    /// Default number of items shown by listings.
    pub recent_items_limit: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user_agent: "feedling/0.1 (+https://github.com/feedling/feedling)".to_string(),
            recent_items_limit: 50,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        Ok(toml::from_str(&contents)?)
    }
}
