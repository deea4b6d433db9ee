//! Configuration for duckpipe
//!
//! Loaded from a YAML file; environment variables override file values:
//!
//! - `DUCKPIPE_DATABASE`, `DUCKPIPE_MEMORY_LIMIT`, `DUCKPIPE_THREADS`
//! - `RUST_LOG`, `LOG_FORMAT`, `LOG_OUTPUT`, `LOG_DIR`

use std::path::Path;

use duckpipe_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from YAML file with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Override fields from `lookup`, normally the process environment
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = lookup("DUCKPIPE_DATABASE") {
            self.engine.database = database;
        }
        if let Some(limit) = lookup("DUCKPIPE_MEMORY_LIMIT") {
            self.engine.memory_limit = Some(limit);
        }
        if let Some(threads) = lookup("DUCKPIPE_THREADS") {
            let parsed = threads.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "DUCKPIPE_THREADS".to_string(),
                value: threads.clone(),
            })?;
            self.engine.threads = Some(parsed);
        }

        if let Some(level) = lookup("RUST_LOG") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.logging.format = format;
        }
        if let Some(output) = lookup("LOG_OUTPUT") {
            self.logging.output = output;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.directory = dir;
        }

        Ok(())
    }
}
