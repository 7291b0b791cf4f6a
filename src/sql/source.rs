//! Collaborator contracts consumed by the transaction facade.
//!
//! The query builder, record metadata, and connection pools are external
//! products. The facade talks to them through these seams: a blocking source
//! opening synchronous sessions, a reactive source publishing sessions, a
//! closed statement AST, and plain row/value shapes.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::core::error::{Error, Result, BLOCKING_ON_PUBLISHER};

/// A single SQL value.
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl Value {
    /// Whether this value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Integer(i) => i.hash(state),
            Self::Real(r) => r.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Bytes(b) => b.hash(state),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// A positional result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    /// Column values in statement order.
    pub values: Vec<Value>,
}

impl Row {
    /// Build a row from values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at `index`, or NULL when the row is narrower.
    pub fn get(&self, index: usize) -> Value {
        self.values.get(index).cloned().unwrap_or(Value::Null)
    }
}

/// Outcome of executing a statement.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Rows affected by a mutating statement.
    pub rows_affected: u64,
    /// Result rows, including RETURNING rows for inserts.
    pub rows: Vec<Row>,
}

/// Row filter composed over field equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Matches every row.
    All,
    /// Field equals value.
    Eq(String, Value),
    /// Conjunction, in declared order.
    And(Vec<Predicate>),
    /// Disjunction.
    Or(Vec<Predicate>),
}

/// Closed statement shape executed by a session. Composition of the actual
/// SQL text belongs to the external query builder.
#[derive(Debug, Clone)]
pub enum Statement {
    /// Multi-row INSERT with RETURNING.
    Insert {
        /// Target table.
        table: String,
        /// Columns being written, in declared order.
        columns: Vec<String>,
        /// One value vector per row, positionally matching `columns`.
        rows: Vec<Vec<Value>>,
        /// Columns to return for each inserted row, in declared order.
        returning: Vec<String>,
        /// Whether conflicting rows are skipped instead of failing.
        on_conflict_do_nothing: bool,
    },
    /// UPDATE with assignments and a filter.
    Update {
        /// Target table.
        table: String,
        /// Column assignments.
        assignments: Vec<(String, Value)>,
        /// Row filter.
        filter: Predicate,
    },
    /// DELETE with a filter.
    Delete {
        /// Target table.
        table: String,
        /// Row filter.
        filter: Predicate,
    },
    /// SELECT of named columns.
    Select {
        /// Source table.
        table: String,
        /// Columns to project, in order.
        columns: Vec<String>,
        /// Row filter.
        filter: Predicate,
    },
    /// `SELECT group_by, COUNT(*) ... GROUP BY group_by`.
    Count {
        /// Source table.
        table: String,
        /// Row filter.
        filter: Predicate,
        /// Grouping column.
        group_by: String,
    },
}

/// Transaction isolation level, forwarded to the driver's native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Dirty reads permitted.
    ReadUncommitted,
    /// Only committed rows visible.
    ReadCommitted,
    /// Repeatable reads within the transaction.
    RepeatableRead,
    /// Full serializability.
    Serializable,
}

impl IsolationLevel {
    /// The driver's native code for this level.
    pub fn native_code(self) -> i32 {
        match self {
            Self::ReadUncommitted => 1,
            Self::ReadCommitted => 2,
            Self::RepeatableRead => 4,
            Self::Serializable => 8,
        }
    }
}

/// A synchronous session against the blocking query source. Every call runs
/// on the calling thread and may block it; the facade only invokes these from
/// a pinned worker.
pub trait BlockingSession: Send {
    /// Set the native connection's transaction isolation level.
    fn set_isolation(&mut self, level: IsolationLevel) -> Result<()>;
    /// Set the native connection's read-only flag.
    fn set_read_only(&mut self, read_only: bool) -> Result<()>;
    /// Begin a transaction.
    fn begin(&mut self) -> Result<()>;
    /// Commit the open transaction.
    fn commit(&mut self) -> Result<()>;
    /// Roll the open transaction back.
    fn rollback(&mut self) -> Result<()>;
    /// Execute one statement.
    fn execute(&mut self, statement: &Statement) -> Result<ExecResult>;
}

/// A blocking query source: opens short-lived synchronous sessions.
pub trait BlockingSource: Send + Sync + 'static {
    /// Open a fresh session on the calling thread.
    fn open(&self) -> Result<Box<dyn BlockingSession>>;
}

/// An asynchronous session obtained from a reactive source.
#[async_trait]
pub trait ReactiveSession: Send {
    /// Set the session's transaction isolation level.
    async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()>;
    /// Execute one statement.
    async fn execute(&mut self, statement: &Statement) -> Result<ExecResult>;
    /// Commit the transaction.
    async fn commit(&mut self) -> Result<()>;
    /// Roll the transaction back.
    async fn rollback(&mut self) -> Result<()>;
}

/// A reactive query source. Its transaction primitive is a single-value
/// publisher of a session; the facade bridges it with [`await_publisher`].
pub trait ReactiveSource: Send + Sync + 'static {
    /// Begin a transaction, publishing exactly one session.
    fn begin(&self) -> oneshot::Receiver<Result<Box<dyn ReactiveSession>>>;
}

/// Bridge a single-value publisher to its one value. A publisher that
/// completes without publishing surfaces as the blocking-bridge wrapper.
pub async fn await_publisher<T>(publisher: oneshot::Receiver<Result<T>>) -> Result<T> {
    match publisher.await {
        Ok(result) => result,
        Err(_) => Err(Error::DataAccess {
            message: BLOCKING_ON_PUBLISHER.to_string(),
            source: None,
        }),
    }
}

/// A query source in either blocking or reactive mode. Mode detection is a
/// one-bit check on this value.
#[derive(Clone)]
pub enum QuerySource {
    /// Synchronous driver; transactions dispatch through the sticky pool.
    Blocking(std::sync::Arc<dyn BlockingSource>),
    /// Reactive driver; transactions use the source's own primitive.
    Reactive(std::sync::Arc<dyn ReactiveSource>),
}

impl QuerySource {
    /// Whether this source requires the sticky dispatcher.
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

/// Evaluate a predicate against a row addressed by column name.
///
/// Exposed for session implementations that filter in memory; SQL-backed
/// sessions translate the predicate instead.
pub fn predicate_matches(
    predicate: &Predicate,
    lookup: &dyn Fn(&str) -> Value,
) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Eq(field, value) => &lookup(field) == value,
        Predicate::And(parts) => parts.iter().all(|p| predicate_matches(p, lookup)),
        Predicate::Or(parts) => parts.iter().any(|p| predicate_matches(p, lookup)),
    }
}
