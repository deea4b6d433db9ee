//! Structured logging setup
//!
//! duckpipe itself only emits `tracing` events. Applications that want to see
//! them can call [`init`] once with a [`LoggingConfig`]:
//!
//! - `level`: an `EnvFilter` directive such as "info" or "duckpipe=debug";
//!   `RUST_LOG` takes precedence when set
//! - `format`: "pretty", "json" or "compact"
//! - `output`: "stdout", "file" or "both"
//! - `directory`: where daily-rotated `duckpipe.log` files are written

use serde::{Deserialize, Serialize};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format for development
    Pretty,
    /// JSON format for production (structured logging)
    Json,
    /// Compact format for testing
    Compact,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty`
    pub fn parse(name: &str) -> Self {
        match name {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    File,
    Both,
}

impl LogOutput {
    /// Unknown names fall back to `Stdout`
    pub fn parse(name: &str) -> Self {
        match name {
            "file" => LogOutput::File,
            "both" => LogOutput::Both,
            _ => LogOutput::Stdout,
        }
    }

    fn to_stdout(self) -> bool {
        matches!(self, LogOutput::Stdout | LogOutput::Both)
    }

    fn to_file(self) -> bool {
        matches!(self, LogOutput::File | LogOutput::Both)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub output: String,
    pub directory: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            output: "stdout".to_string(),
            directory: "./logs".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.format)
    }

    pub fn log_output(&self) -> LogOutput {
        LogOutput::parse(&self.output)
    }
}

/// Install the global subscriber.
///
/// Fails rather than panicking when a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let format = config.log_format();
    let output = config.log_output();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::Logging(e.to_string()))?;

    let stdout_layer = output.to_stdout().then(|| match format {
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    });

    let file_layer = if output.to_file() {
        std::fs::create_dir_all(&config.directory).map_err(|source| Error::Io {
            path: config.directory.clone().into(),
            source,
        })?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &config.directory, "duckpipe.log");
        Some(fmt::layer().with_writer(appender).with_ansi(false).boxed())
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    tracing::info!(format = ?format, output = ?output, "logging initialized");
    Ok(())
}
