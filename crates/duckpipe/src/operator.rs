//! Pipeline operators and the values they produce
//!
//! An [`Operator`] is one step of a pipeline. Applying it to an [`Output`]
//! yields the next [`Output`]. Relations and collections interpret the full
//! operator set; plain values only accept invocable operators.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use arrow::record_batch::RecordBatch;
use duckpipe_engine::Frame;
use serde_json::Value;
use tracing::debug;

use crate::collection::Collection;
use crate::error::{Error, Result};
use crate::relation::Relation;

/// User-supplied step: receives the current value, returns the next one.
pub type Transform = Rc<dyn Fn(Output) -> Result<Output>>;

/// In-memory format produced by materialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Arrow record batch (columnar)
    #[default]
    Arrow,
    /// Row-oriented frame of JSON values
    Frame,
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "arrow" => Ok(Format::Arrow),
            "frame" => Ok(Format::Frame),
            other => Err(format!("unknown format: {}", other)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Arrow => f.write_str("arrow"),
            Format::Frame => f.write_str("frame"),
        }
    }
}

/// Shape coercion target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Single value of a one-row or one-column result
    Scalar,
    /// Values of the single row or single column
    List,
    /// Column name to value for a single row
    Mapping,
}

#[derive(Clone)]
pub enum Operator {
    /// SQL snippet, the fallback for any unrecognized text
    Sql(String),
    /// Promote a relation into a collection under this name
    Alias(String),
    /// Apply each operator in turn
    Sequence(Vec<Operator>),
    Materialize(Format),
    Coerce(Shape),
    Invoke(Transform),
}

impl Operator {
    pub fn sql(text: impl Into<String>) -> Self {
        Operator::Sql(text.into())
    }

    pub fn alias(name: impl Into<String>) -> Self {
        Operator::Alias(name.into())
    }

    pub fn invoke<F>(f: F) -> Self
    where
        F: Fn(Output) -> Result<Output> + 'static,
    {
        Operator::Invoke(Rc::new(f))
    }

    /// Short name used in logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Operator::Sql(_) => "sql",
            Operator::Alias(_) => "alias",
            Operator::Sequence(_) => "sequence",
            Operator::Materialize(_) => "materialize",
            Operator::Coerce(Shape::Scalar) => "scalar coercion",
            Operator::Coerce(Shape::List) => "list coercion",
            Operator::Coerce(Shape::Mapping) => "mapping coercion",
            Operator::Invoke(_) => "invoke",
        }
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Sql(s) => f.debug_tuple("Sql").field(s).finish(),
            Operator::Alias(s) => f.debug_tuple("Alias").field(s).finish(),
            Operator::Sequence(ops) => f.debug_tuple("Sequence").field(ops).finish(),
            Operator::Materialize(format) => f.debug_tuple("Materialize").field(format).finish(),
            Operator::Coerce(shape) => f.debug_tuple("Coerce").field(shape).finish(),
            Operator::Invoke(_) => f.write_str("Invoke(<fn>)"),
        }
    }
}

/// Text becomes an alias (`as <name>`), a materialization tag (`arrow`,
/// `frame`) or otherwise a SQL snippet.
impl From<&str> for Operator {
    fn from(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(name) = trimmed.strip_prefix("as ") {
            return Operator::Alias(name.trim().to_string());
        }
        match trimmed.parse::<Format>() {
            Ok(format) => Operator::Materialize(format),
            Err(_) => Operator::Sql(text.to_string()),
        }
    }
}

impl From<String> for Operator {
    fn from(text: String) -> Self {
        Operator::from(text.as_str())
    }
}

impl From<&String> for Operator {
    fn from(text: &String) -> Self {
        Operator::from(text.as_str())
    }
}

impl From<Format> for Operator {
    fn from(format: Format) -> Self {
        Operator::Materialize(format)
    }
}

impl From<Shape> for Operator {
    fn from(shape: Shape) -> Self {
        Operator::Coerce(shape)
    }
}

impl<T: Into<Operator>> From<Vec<T>> for Operator {
    fn from(ops: Vec<T>) -> Self {
        Operator::Sequence(ops.into_iter().map(Into::into).collect())
    }
}

/// Build a `Vec<Operator>` from heterogeneous operator values.
///
/// ```ignore
/// relation.apply(ops!["select a + 1 as b", Shape::List])?;
/// ```
#[macro_export]
macro_rules! ops {
    ($($op:expr),* $(,)?) => {
        vec![$($crate::Operator::from($op)),*]
    };
}

/// Anything a pipeline step can produce
#[derive(Debug, Clone)]
pub enum Output {
    Relation(Relation),
    Collection(Collection),
    Arrow(RecordBatch),
    Frame(Frame),
    /// Result of a shape coercion: scalar, array or object
    Value(Value),
}

impl Output {
    pub fn kind(&self) -> &'static str {
        match self {
            Output::Relation(_) => "relation",
            Output::Collection(_) => "collection",
            Output::Arrow(_) => "record batch",
            Output::Frame(_) => "frame",
            Output::Value(_) => "value",
        }
    }

    pub fn apply_one(self, op: impl Into<Operator>) -> Result<Output> {
        match self {
            Output::Relation(relation) => relation.apply_one(op),
            Output::Collection(collection) => collection.apply_one(op),
            value => match op.into() {
                Operator::Sequence(ops) => value.apply(ops),
                Operator::Invoke(f) => {
                    debug!(output = value.kind(), "invoking transform on value");
                    f(value)
                }
                other => Err(Error::NotAnEntity {
                    operator: other.kind(),
                    output: value.kind(),
                }),
            },
        }
    }

    /// Apply operators left to right; no operators returns `self`
    pub fn apply<I>(self, ops: I) -> Result<Output>
    where
        I: IntoIterator,
        I::Item: Into<Operator>,
    {
        ops.into_iter().try_fold(self, |current, op| current.apply_one(op))
    }

    pub fn into_relation(self) -> Option<Relation> {
        match self {
            Output::Relation(relation) => Some(relation),
            _ => None,
        }
    }

    pub fn into_collection(self) -> Option<Collection> {
        match self {
            Output::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn into_arrow(self) -> Option<RecordBatch> {
        match self {
            Output::Arrow(batch) => Some(batch),
            _ => None,
        }
    }

    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Output::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            Output::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Relation> for Output {
    fn from(relation: Relation) -> Self {
        Output::Relation(relation)
    }
}

impl From<Collection> for Output {
    fn from(collection: Collection) -> Self {
        Output::Collection(collection)
    }
}

impl From<RecordBatch> for Output {
    fn from(batch: RecordBatch) -> Self {
        Output::Arrow(batch)
    }
}

impl From<Frame> for Output {
    fn from(frame: Frame) -> Self {
        Output::Frame(frame)
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Value(value)
    }
}

// `x | op` and `x >> op` are both `x.apply_one(op)`
macro_rules! impl_pipe {
    ($($target:ty),*) => {
        $(
            impl<O: Into<Operator>> std::ops::BitOr<O> for $target {
                type Output = Result<Output>;

                fn bitor(self, op: O) -> Result<Output> {
                    self.apply_one(op)
                }
            }

            impl<O: Into<Operator>> std::ops::Shr<O> for $target {
                type Output = Result<Output>;

                fn shr(self, op: O) -> Result<Output> {
                    self.apply_one(op)
                }
            }
        )*
    };
}

impl_pipe!(Relation, Collection, Output);
