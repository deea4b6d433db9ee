//! DuckDB binding for duckpipe relations
//!
//! Every relation lives engine-side as a temporary view (or, for in-memory
//! inputs, a temporary table) with a generated name. A [`RelationHandle`]
//! owns that object and drops it once the last handle referencing it goes
//! away. Handles derived from other handles keep their inputs alive.

use std::fmt;
use std::path::Path;
use std::rc::Rc;

use arrow::compute::concat_batches;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use duckdb::vtab::arrow::{arrow_recordbatch_to_query_params, ArrowVTab};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

mod frame;

pub use frame::Frame;

/// Table function used to scan in-memory Arrow data.
pub const ARROW_SCAN: &str = "arrow";

/// Prefix of the engine-side objects backing relation handles.
pub const RELATION_PREFIX: &str = "_rel_";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Connection settings applied when the engine is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database file, or `:memory:`
    pub database: String,

    /// DuckDB `memory_limit` setting, e.g. "2GB"
    pub memory_limit: Option<String>,

    /// DuckDB `threads` setting
    pub threads: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: ":memory:".to_string(),
            memory_limit: None,
            threads: None,
        }
    }
}

/// Cheaply clonable handle to a single DuckDB connection.
///
/// The engine is single-threaded: clones share the connection through an
/// `Rc` and are not `Send`.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

struct EngineInner {
    conn: Connection,
}

impl Engine {
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.register_table_function::<ArrowVTab>(ARROW_SCAN)?;
        Ok(Self {
            inner: Rc::new(EngineInner { conn }),
        })
    }

    /// Open the configured database and apply its settings
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let engine = if config.database == ":memory:" {
            Self::open_in_memory()?
        } else {
            Self::open(&config.database)?
        };
        engine.apply_settings(config)?;
        Ok(engine)
    }

    fn apply_settings(&self, config: &EngineConfig) -> Result<()> {
        if let Some(ref limit) = config.memory_limit {
            let pragma = format!("SET memory_limit = '{}'", limit.replace('\'', "''"));
            self.connection().execute_batch(&pragma)?;
        }
        if let Some(threads) = config.threads {
            self.connection()
                .execute_batch(&format!("SET threads = {}", threads))?;
        }
        debug!(
            database = %config.database,
            memory_limit = ?config.memory_limit,
            threads = ?config.threads,
            "engine settings applied"
        );
        Ok(())
    }

    /// Get the underlying connection for setup/introspection
    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    pub fn same_engine(&self, other: &Engine) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Load a file path, URL or table identifier as a lazy relation.
    ///
    /// The input is quoted as an identifier, so DuckDB's replacement scans
    /// resolve `.csv`, `.parquet`, `.json` and remote paths.
    pub fn load_path(&self, path: &str) -> Result<RelationHandle> {
        debug!(path, "loading relation from path");
        self.create(
            HandleKind::View,
            &format!("select * from {}", quote_ident(path)),
            Vec::new(),
        )
    }

    /// Copy an in-memory record batch into the engine.
    pub fn load_arrow(&self, batch: RecordBatch) -> Result<RelationHandle> {
        debug!(
            rows = batch.num_rows(),
            columns = batch.num_columns(),
            "loading relation from record batch"
        );
        // The scan takes ownership of the exported FFI structs at bind time,
        // so the addresses are inlined and the statement is bound once.
        // The table function only accepts UBIGINT arguments.
        let [array, schema] = arrow_recordbatch_to_query_params(batch);
        self.create(
            HandleKind::Table,
            &format!(
                "select * from {}({}::UBIGINT, {}::UBIGINT)",
                ARROW_SCAN, array, schema
            ),
            Vec::new(),
        )
    }

    pub fn load_frame(&self, frame: &Frame) -> Result<RelationHandle> {
        self.load_arrow(frame.to_record_batch()?)
    }

    /// Run `sql` with each binding visible under its name.
    ///
    /// Bindings shadow catalog tables of the same name for this statement
    /// only. Handles owned by a different engine are copied in through Arrow.
    pub fn query(&self, sql: &str, bindings: &[(&str, &RelationHandle)]) -> Result<RelationHandle> {
        let mut inputs = Vec::with_capacity(bindings.len());
        let mut ctes = Vec::with_capacity(bindings.len());

        for (name, handle) in bindings {
            let local = self.adopt(handle)?;
            ctes.push(format!("{} AS (FROM {})", quote_ident(name), quote_ident(local.name())));
            inputs.push(local);
        }

        let select = compose(sql, &ctes);
        self.create(HandleKind::View, &select, inputs)
    }

    /// Register `handle` as `fresh_name` for one query, then run `sql`.
    pub fn requery(&self, handle: &RelationHandle, fresh_name: &str, sql: &str) -> Result<RelationHandle> {
        self.query(sql, &[(fresh_name, handle)])
    }

    fn adopt(&self, handle: &RelationHandle) -> Result<RelationHandle> {
        if self.same_engine(handle.engine()) {
            Ok(handle.clone())
        } else {
            debug!(relation = handle.name(), "copying relation from another connection");
            self.load_arrow(handle.to_arrow()?)
        }
    }

    fn create(&self, kind: HandleKind, select: &str, inputs: Vec<RelationHandle>) -> Result<RelationHandle> {
        let name = fresh_name(RELATION_PREFIX);
        let ddl = format!("CREATE TEMP {} {} AS {}", kind.keyword(), quote_ident(&name), select);

        debug!(relation = %name, sql = %select, "creating relation");

        match kind {
            // Single prepared statement: user SQL never runs as a batch
            HandleKind::View => {
                self.connection().execute(&ddl, [])?;
            }
            HandleKind::Table => self.connection().execute_batch(&ddl)?,
        }

        Ok(RelationHandle {
            inner: Rc::new(HandleInner {
                engine: self.clone(),
                name,
                kind,
                sql: select.to_string(),
                _inputs: inputs,
            }),
        })
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("handles", &Rc::strong_count(&self.inner))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandleKind {
    View,
    Table,
}

impl HandleKind {
    fn keyword(self) -> &'static str {
        match self {
            HandleKind::View => "VIEW",
            HandleKind::Table => "TABLE",
        }
    }
}

/// Opaque engine-side lazy relation.
#[derive(Clone)]
pub struct RelationHandle {
    inner: Rc<HandleInner>,
}

struct HandleInner {
    engine: Engine,
    name: String,
    kind: HandleKind,
    sql: String,
    // Dropped after this handle's own object, so dependents go first
    _inputs: Vec<RelationHandle>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        let sql = format!("DROP {} IF EXISTS {}", self.kind.keyword(), quote_ident(&self.name));
        if let Err(e) = self.engine.connection().execute_batch(&sql) {
            warn!(relation = %self.name, error = %e, "failed to drop relation");
        }
    }
}

impl RelationHandle {
    /// Engine-side name of the view or table
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The SELECT statement this handle was created from
    pub fn sql(&self) -> &str {
        &self.inner.sql
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    /// Materialize as a single Arrow record batch
    pub fn to_arrow(&self) -> Result<RecordBatch> {
        self.fetch(&format!("SELECT * FROM {}", quote_ident(self.name())))
    }

    /// Materialize as a row-oriented frame
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::from_record_batch(&self.to_arrow()?)
    }

    pub fn row_count(&self) -> Result<u64> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(self.name()));
        let count: i64 = self.engine().connection().query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Pretty-printed table of the first `limit` rows
    pub fn preview(&self, limit: usize) -> Result<String> {
        let batch = self.fetch(&format!("SELECT * FROM {} LIMIT {}", quote_ident(self.name()), limit))?;
        Ok(pretty_format_batches(&[batch])?.to_string())
    }

    fn fetch(&self, sql: &str) -> Result<RecordBatch> {
        debug!(relation = self.name(), sql, "materializing relation");
        let mut stmt = self.engine().connection().prepare(sql)?;
        let arrow = stmt.query_arrow([])?;
        let schema = arrow.get_schema();
        let batches: Vec<RecordBatch> = arrow.collect();
        Ok(concat_batches(&schema, &batches)?)
    }
}

impl fmt::Debug for RelationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationHandle")
            .field("name", &self.inner.name)
            .field("sql", &self.inner.sql)
            .finish()
    }
}

/// Generate an identifier unlikely to collide with user table names.
///
/// The suffix is the 32 lowercase hex digits of a v4 UUID.
pub fn fresh_name(prefix: &str) -> String {
    format!("{}{}", prefix, Uuid::new_v4().simple())
}

/// Quote a name as a SQL identifier
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Attach the binding CTEs to a user statement.
///
/// Plain SELECT/FROM statements take the WITH clause directly; anything else
/// (its own WITH, DESCRIBE, PIVOT, ...) is wrapped as a subquery. The closing
/// paren goes on its own line so a trailing `--` comment cannot swallow it.
fn compose(sql: &str, ctes: &[String]) -> String {
    let body = sql.trim().trim_end_matches(';').trim_end();
    if ctes.is_empty() {
        return body.to_string();
    }

    let with = ctes.join(", ");
    let first = body
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();

    match first.as_str() {
        "select" | "from" => format!("WITH {} {}", with, body),
        _ => format!("WITH {} FROM ({}\n)", with, body),
    }
}
