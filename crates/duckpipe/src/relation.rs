//! A single lazily evaluated relation
//!
//! SQL applied to a relation is scoped to it implicitly: the snippet is run
//! as `FROM <name> <snippet>`, where `<name>` is generated per call.

use std::fmt;
use std::rc::Rc;

use arrow::record_batch::RecordBatch;
use duckpipe_engine::{fresh_name, quote_ident, Engine, Frame, RelationHandle};
use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::Collection;
use crate::error::Result;
use crate::operator::{Format, Operator, Output, Shape};
use crate::shape;

/// Prefix of the per-call names relations are bound under
pub const SNIPPET_PREFIX: &str = "_tlb_";

/// What a relation was built from. Kept for display only.
#[derive(Debug, Clone)]
pub enum Raw {
    /// File path, URL or table identifier
    Path(String),
    Arrow(RecordBatch),
    Frame(Frame),
    /// SQL statement or snippet that produced the relation
    Query(String),
}

impl Raw {
    fn load(&self, engine: &Engine) -> Result<RelationHandle> {
        let handle = match self {
            Raw::Path(path) => engine.load_path(path)?,
            Raw::Arrow(batch) => engine.load_arrow(batch.clone())?,
            Raw::Frame(frame) => engine.load_frame(frame)?,
            Raw::Query(sql) => engine.query(sql, &[])?,
        };
        Ok(handle)
    }
}

impl From<&str> for Raw {
    fn from(path: &str) -> Self {
        Raw::Path(path.to_string())
    }
}

impl From<String> for Raw {
    fn from(path: String) -> Self {
        Raw::Path(path)
    }
}

impl From<RecordBatch> for Raw {
    fn from(batch: RecordBatch) -> Self {
        Raw::Arrow(batch)
    }
}

impl From<Frame> for Raw {
    fn from(frame: Frame) -> Self {
        Raw::Frame(frame)
    }
}

/// One engine relation plus the input it came from.
///
/// Cloning is the re-wrap of an existing relation: `raw` and the handle
/// are shared, nothing is loaded again.
#[derive(Clone)]
pub struct Relation {
    raw: Rc<Raw>,
    handle: RelationHandle,
}

impl Relation {
    /// Load `raw` through the engine
    pub fn load(engine: &Engine, raw: impl Into<Raw>) -> Result<Self> {
        let raw = raw.into();
        let handle = raw.load(engine)?;
        Ok(Self::from_handle(raw, handle))
    }

    /// Start a pipeline from a complete SQL statement
    pub fn query(engine: &Engine, sql: impl Into<String>) -> Result<Self> {
        Self::load(engine, Raw::Query(sql.into()))
    }

    pub fn from_handle(raw: Raw, handle: RelationHandle) -> Self {
        Self {
            raw: Rc::new(raw),
            handle,
        }
    }

    pub fn raw(&self) -> &Raw {
        &self.raw
    }

    pub fn handle(&self) -> &RelationHandle {
        &self.handle
    }

    pub fn engine(&self) -> &Engine {
        self.handle.engine()
    }

    /// Run a snippet with this relation as its implicit `FROM`
    pub fn sql(&self, snippet: &str) -> Result<Relation> {
        let name = fresh_name(SNIPPET_PREFIX);
        let statement = format!("FROM {} {}", quote_ident(&name), snippet);
        let handle = self.engine().requery(&self.handle, &name, &statement)?;
        Ok(Self::from_handle(Raw::Query(snippet.to_string()), handle))
    }

    pub fn to_arrow(&self) -> Result<RecordBatch> {
        Ok(self.handle.to_arrow()?)
    }

    pub fn to_frame(&self) -> Result<Frame> {
        Ok(self.handle.to_frame()?)
    }

    pub fn materialize(&self, format: Format) -> Result<Output> {
        Ok(match format {
            Format::Arrow => Output::Arrow(self.to_arrow()?),
            Format::Frame => Output::Frame(self.to_frame()?),
        })
    }

    pub fn as_list(&self) -> Result<Vec<Value>> {
        shape::to_list(&self.to_frame()?)
    }

    pub fn as_scalar(&self) -> Result<Value> {
        shape::to_scalar(&self.to_frame()?)
    }

    pub fn as_mapping(&self) -> Result<Map<String, Value>> {
        shape::to_mapping(&self.to_frame()?)
    }

    /// Promote into a single-entry collection
    pub fn alias(self, name: impl Into<String>) -> Collection {
        let engine = self.engine().clone();
        Collection::new(engine, [(name.into(), self)])
    }

    pub fn apply_one(self, op: impl Into<Operator>) -> Result<Output> {
        let op = op.into();
        debug!(operator = op.kind(), relation = self.handle.name(), "applying operator");

        match op {
            Operator::Alias(name) => Ok(Output::Collection(self.alias(name))),
            Operator::Sequence(ops) => self.apply(ops),
            Operator::Materialize(format) => self.materialize(format),
            Operator::Coerce(Shape::Scalar) => self.as_scalar().map(Output::Value),
            Operator::Coerce(Shape::List) => self.as_list().map(|v| Output::Value(Value::Array(v))),
            Operator::Coerce(Shape::Mapping) => {
                self.as_mapping().map(|m| Output::Value(Value::Object(m)))
            }
            Operator::Invoke(f) => f(Output::Relation(self)),
            Operator::Sql(snippet) => self.sql(&snippet).map(Output::Relation),
        }
    }

    /// Apply operators left to right; no operators returns the relation
    pub fn apply<I>(self, ops: I) -> Result<Output>
    where
        I: IntoIterator,
        I::Item: Into<Operator>,
    {
        Output::Relation(self).apply(ops)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle.preview(10) {
            Ok(table) => f.write_str(&table),
            Err(e) => write!(f, "<relation {}: {}>", self.handle.name(), e),
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("raw", &self.raw)
            .field("handle", &self.handle)
            .finish()
    }
}
