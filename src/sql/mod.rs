//! Transaction facade, record operations, and result-shape helpers.

pub mod record;
pub mod result;
pub mod source;
pub mod transaction;

pub use record::{Column, Record};
pub use result::Rows;
pub use source::{
    await_publisher, BlockingSession, BlockingSource, ExecResult, IsolationLevel, Predicate,
    QuerySource, ReactiveSession, ReactiveSource, Row, Statement, Value,
};
pub use transaction::{SqlClient, Transaction, TransactionOptions};
