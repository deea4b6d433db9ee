use std::path::PathBuf;

use duckpipe_engine::EngineError;
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("result should have {expected}, but has shape ({rows}, {columns})")]
    Shape {
        expected: &'static str,
        rows: usize,
        columns: usize,
    },

    #[error("no table named '{0}' in collection")]
    Lookup(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("unexpected {context}: {value}")]
    UnexpectedValue { context: String, value: Value },

    #[error("{operator} is not supported on a {target}")]
    Unsupported {
        operator: &'static str,
        target: &'static str,
    },

    #[error("cannot apply {operator} to {output}: only invocable operators accept plain values")]
    NotAnEntity {
        operator: &'static str,
        output: &'static str,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Error raised from a user-supplied transform
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }
}
