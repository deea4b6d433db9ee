//! A named set of relations queried together
//!
//! Unlike a relation, table names must be spelled out explicitly in SQL run
//! against a collection: every table is bound under its logical name and the
//! statement runs as written.

use std::collections::BTreeMap;
use std::fmt;

use duckpipe_engine::{quote_ident, Engine, Frame, RelationHandle};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{Error, Result};
use crate::operator::{Format, Operator, Output, Shape};
use crate::relation::{Raw, Relation};
use crate::resolve::resolve_sql;

#[derive(Clone)]
pub struct Collection {
    engine: Engine,
    tables: BTreeMap<String, Relation>,
}

impl Collection {
    pub fn new<I, K>(engine: Engine, tables: I) -> Self
    where
        I: IntoIterator<Item = (K, Relation)>,
        K: Into<String>,
    {
        Self {
            engine,
            tables: tables.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn empty(engine: Engine) -> Self {
        Self::new(engine, std::iter::empty::<(String, Relation)>())
    }

    /// Load every raw input and bind it under its name
    pub fn load<I, K, R>(engine: &Engine, inputs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, R)>,
        K: Into<String>,
        R: Into<Raw>,
    {
        let tables = inputs
            .into_iter()
            .map(|(name, raw)| Ok((name.into(), Relation::load(engine, raw)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self {
            engine: engine.clone(),
            tables,
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The raw input bound under `name`
    pub fn get(&self, name: &str) -> Result<&Raw> {
        self.relation(name).map(Relation::raw)
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::Lookup(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.tables.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Run a complete statement with every table bound by name.
    ///
    /// `statement` may also name a `.sql` file holding the statement.
    pub fn sql(&self, statement: &str) -> Result<Relation> {
        let statement = resolve_sql(statement)?;
        let bindings: Vec<(&str, &RelationHandle)> = self
            .tables
            .iter()
            .map(|(name, relation)| (name.as_str(), relation.handle()))
            .collect();

        let handle = self.engine.query(&statement, &bindings)?;
        Ok(Relation::from_handle(Raw::Query(statement.into_owned()), handle))
    }

    /// Re-query every table as `from <name>` and hold the result in memory.
    ///
    /// The returned collection has the same names, and [`Collection::get`]
    /// returns the materialized copy. Each relation is reloaded from the
    /// fetched record batch whatever the format, so column types the JSON
    /// reader lacks (intervals, blobs) survive a frame materialization.
    pub fn materialize(&self, format: Format) -> Result<Collection> {
        let mut tables = BTreeMap::new();
        for name in self.tables.keys() {
            let batch = self.sql(&format!("from {}", quote_ident(name)))?.to_arrow()?;
            let handle = self.engine.load_arrow(batch.clone())?;
            let raw = match format {
                Format::Arrow => Raw::Arrow(batch),
                Format::Frame => Raw::Frame(Frame::from_record_batch(&batch)?),
            };
            tables.insert(name.clone(), Relation::from_handle(raw, handle));
        }
        debug!(tables = tables.len(), %format, "collection materialized");
        Ok(Self {
            engine: self.engine.clone(),
            tables,
        })
    }

    /// Row count and column names of one table, via the collection itself
    fn dimensions(&self, name: &str) -> Result<(u64, Vec<String>)> {
        let table = quote_ident(name);

        let count = self
            .sql(&format!("select count() from {}", table))?
            .as_scalar()?;
        let rows = row_count(name, count)?;

        let schema = self.sql(&format!("from {} limit 0", table))?.to_arrow()?.schema();
        let columns = schema.fields().iter().map(|f| f.name().clone()).collect();

        Ok((rows, columns))
    }

    fn names_value(&self) -> Value {
        Value::Array(self.names().map(|n| Value::String(n.to_string())).collect())
    }

    /// `{name: {"rows": n, "columns": [...]}}` for every table
    fn summary(&self) -> Result<Value> {
        let mut out = Map::new();
        for name in self.tables.keys() {
            let (rows, columns) = self.dimensions(name)?;
            out.insert(name.clone(), json!({ "rows": rows, "columns": columns }));
        }
        Ok(Value::Object(out))
    }

    /// Multi-line listing of the bound tables
    pub fn describe(&self) -> Result<String> {
        let mut out = String::from("Collection:");
        if self.tables.is_empty() {
            out.push_str(" None");
            return Ok(out);
        }

        for (name, relation) in &self.tables {
            let line = match relation.raw() {
                Raw::Path(path) => format!("{}: '{}'", name, path),
                _ => {
                    let (rows, columns) = self.dimensions(name)?;
                    format!("{}: {} x [{}]", name, rows, columns.join(", "))
                }
            };
            out.push_str("\n    ");
            out.push_str(&line);
        }
        Ok(out)
    }

    pub fn apply_one(self, op: impl Into<Operator>) -> Result<Output> {
        let op = op.into();
        debug!(operator = op.kind(), tables = self.tables.len(), "applying operator");

        match op {
            // Aliasing is a relation-only operation; the text goes to the engine as is
            Operator::Alias(name) => self.sql(&format!("as {}", name)).map(Output::Relation),
            Operator::Sequence(ops) => self.apply(ops),
            Operator::Materialize(format) => self.materialize(format).map(Output::Collection),
            Operator::Coerce(Shape::List) => Ok(Output::Value(self.names_value())),
            Operator::Coerce(Shape::Mapping) => self.summary().map(Output::Value),
            Operator::Coerce(Shape::Scalar) => Err(Error::Unsupported {
                operator: "scalar coercion",
                target: "collection",
            }),
            Operator::Invoke(f) => f(Output::Collection(self)),
            Operator::Sql(statement) => self.sql(&statement).map(Output::Relation),
        }
    }

    /// Apply operators left to right; no operators returns the collection
    pub fn apply<I>(self, ops: I) -> Result<Output>
    where
        I: IntoIterator,
        I::Item: Into<Operator>,
    {
        Output::Collection(self).apply(ops)
    }
}

fn row_count(table: &str, count: Value) -> Result<u64> {
    count.as_u64().ok_or_else(|| Error::UnexpectedValue {
        context: format!("row count of '{}'", table),
        value: count,
    })
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.describe() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "Collection: <{}>", e),
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.tables.iter()).finish()
    }
}
