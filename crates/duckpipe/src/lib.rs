//! Fluent operator pipelines over DuckDB
//!
//! A [`Relation`] wraps one lazily evaluated engine relation; a
//! [`Collection`] binds several relations under names. Both accept a stream
//! of [`Operator`]s: SQL text, `as <name>` aliases, materialization tags,
//! shape coercions, nested sequences and plain functions.
//!
//! ```ignore
//! use duckpipe::prelude::*;
//!
//! let engine = Engine::open_in_memory()?;
//! let total = Relation::load(&engine, "orders.csv")?
//!     .apply(ops!["select sum(amount)", Shape::Scalar])?;
//! ```

pub mod collection;
pub mod config;
pub mod error;
pub mod logging;
pub mod operator;
pub mod relation;
pub mod resolve;
pub mod shape;

pub use collection::Collection;
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use operator::{Format, Operator, Output, Shape, Transform};
pub use relation::{Raw, Relation};
pub use resolve::resolve_sql;

pub use duckpipe_engine::{fresh_name, Engine, EngineConfig, EngineError, Frame, RelationHandle};

/// Everything needed to build and run pipelines
pub mod prelude {
    pub use crate::ops;
    pub use crate::{Collection, Engine, Error, Format, Frame, Operator, Output, Raw, Relation, Result, Shape};
}

/// Open the engine described by `config`, installing logging first.
pub fn open(config: &Config) -> Result<Engine> {
    logging::init(&config.logging)?;
    tracing::info!(database = %config.engine.database, "opening engine");
    Ok(Engine::from_config(&config.engine)?)
}
