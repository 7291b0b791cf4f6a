//! Suspension-friendly transactions over blocking and reactive sources.
//!
//! Blocking-mode transactions dispatch through the sticky dispatcher so that
//! everything between begin and commit runs on one pinned worker thread, even
//! across suspension points. Reactive-mode transactions delegate to the
//! source's own transaction primitive and never touch the dispatcher.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::record::{
    changed_columns, clear_changed, copy_back, primary_key_predicate, Record,
};
use super::result::Rows;
use super::source::{
    await_publisher, BlockingSession, BlockingSource, ExecResult, IsolationLevel, Predicate,
    QuerySource, ReactiveSession, ReactiveSource, Statement, Value,
};
use crate::core::dispatcher::Dispatcher;
use crate::core::error::{unwrap_data_access, Error, Result, ROLLBACK_CAUSED};

/// Options applied to a transaction before any user code runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Isolation level to set on the native connection. `None` keeps the
    /// driver default.
    pub isolation: Option<IsolationLevel>,
    /// Open the transaction read-only. Ignored with a diagnostic on reactive
    /// connections.
    pub read_only: bool,
}

/// Facade over a query source. Cheap to clone.
#[derive(Clone)]
pub struct SqlClient {
    source: QuerySource,
    dispatcher: Dispatcher,
}

impl SqlClient {
    /// Build a client over `source`, using `dispatcher` for blocking-mode
    /// transactions.
    pub fn new(source: QuerySource, dispatcher: Dispatcher) -> Self {
        Self { source, dispatcher }
    }

    /// The dispatcher backing blocking-mode transactions.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Close the underlying dispatcher pool.
    pub fn close(&self) {
        self.dispatcher.close();
    }

    /// Run `body` in a transaction with default options.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.transaction_with(TransactionOptions::default(), body)
            .await
    }

    /// Run `body` in a transaction.
    ///
    /// Commits when `body` returns `Ok`, rolls back otherwise. The surfaced
    /// error is normalized so callers observe the original cause rather than
    /// the bridge's wrappers.
    pub async fn transaction_with<F, Fut, T>(
        &self,
        options: TransactionOptions,
        body: F,
    ) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let result = match &self.source {
            QuerySource::Blocking(source) => {
                let source = Arc::clone(source);
                self.dispatcher
                    .run(move || blocking_transaction(source, options, body))
                    .await
                    .and_then(|inner| inner)
            }
            QuerySource::Reactive(source) => {
                reactive_transaction(Arc::clone(source), options, body).await
            }
        };
        result.map_err(unwrap_data_access)
    }
}

async fn blocking_transaction<F, Fut, T>(
    source: Arc<dyn BlockingSource>,
    options: TransactionOptions,
    body: F,
) -> Result<T>
where
    F: FnOnce(Transaction) -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    let mut session = source.open()?;
    // Configure the native connection before any user code runs; nothing is
    // restored on exit, the connection goes back to the driver's pool.
    if let Some(level) = options.isolation {
        session.set_isolation(level)?;
    }
    if options.read_only {
        session.set_read_only(true)?;
    }
    session.begin()?;
    run_body(Transaction::blocking(session), body).await
}

async fn reactive_transaction<F, Fut, T>(
    source: Arc<dyn ReactiveSource>,
    options: TransactionOptions,
    body: F,
) -> Result<T>
where
    F: FnOnce(Transaction) -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    if options.read_only {
        warn!("read-only transactions are not supported on reactive connections; ignoring");
    }
    let mut session = await_publisher(source.begin()).await?;
    if let Some(level) = options.isolation {
        session.set_isolation(level).await?;
    }
    run_body(Transaction::reactive(session), body).await
}

async fn run_body<F, Fut, T>(trx: Transaction, body: F) -> Result<T>
where
    F: FnOnce(Transaction) -> Fut + Send,
    Fut: Future<Output = Result<T>> + Send,
    T: Send,
{
    match body(trx.clone()).await {
        Ok(value) => {
            trx.commit().await?;
            Ok(value)
        }
        Err(Error::RollbackRequested) => {
            trx.rollback().await?;
            Err(Error::RollbackRequested)
        }
        Err(cause) => {
            if let Err(rollback_err) = trx.rollback().await {
                debug!(error = %rollback_err, "rollback failed after transaction error");
            }
            Err(Error::data_access(ROLLBACK_CAUSED, cause))
        }
    }
}

enum SessionKind {
    Blocking(parking_lot::Mutex<Box<dyn BlockingSession>>),
    Reactive(tokio::sync::Mutex<Box<dyn ReactiveSession>>),
}

/// Handle to an in-progress transaction. Every helper is a suspension point;
/// on a blocking source they resume on the pinned worker thread.
#[derive(Clone)]
pub struct Transaction {
    session: Arc<SessionKind>,
}

impl Transaction {
    fn blocking(session: Box<dyn BlockingSession>) -> Self {
        Self {
            session: Arc::new(SessionKind::Blocking(parking_lot::Mutex::new(session))),
        }
    }

    fn reactive(session: Box<dyn ReactiveSession>) -> Self {
        Self {
            session: Arc::new(SessionKind::Reactive(tokio::sync::Mutex::new(session))),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<ExecResult> {
        match self.session.as_ref() {
            SessionKind::Blocking(session) => session.lock().execute(statement),
            SessionKind::Reactive(session) => session.lock().await.execute(statement).await,
        }
    }

    async fn commit(&self) -> Result<()> {
        match self.session.as_ref() {
            SessionKind::Blocking(session) => session.lock().commit(),
            SessionKind::Reactive(session) => session.lock().await.commit().await,
        }
    }

    async fn rollback(&self) -> Result<()> {
        match self.session.as_ref() {
            SessionKind::Blocking(session) => session.lock().rollback(),
            SessionKind::Reactive(session) => session.lock().await.rollback().await,
        }
    }

    /// Insert `record`.
    ///
    /// Does nothing and returns 0 when no field is marked changed. Otherwise
    /// inserts, copies the returned row (including generated keys) back into
    /// the record, clears all changed flags, and returns 1.
    pub async fn insert<R: Record>(&self, record: &mut R) -> Result<u64> {
        let columns = changed_columns(record);
        if columns.is_empty() {
            return Ok(0);
        }
        let values: Vec<Value> = columns.iter().map(|c| record.get(c)).collect();
        let statement = Statement::Insert {
            table: record.table().to_string(),
            returning: all_column_names(record),
            columns,
            rows: vec![values],
            on_conflict_do_nothing: false,
        };
        let result = self.execute(&statement).await?;
        if let Some(row) = result.rows.first() {
            copy_back(record, row);
        }
        Ok(1)
    }

    /// Insert every record, returning the count inserted. A no-op when the
    /// slice is empty or no record has changes. Returning rows are copied
    /// back positionally.
    pub async fn insert_all<R: Record>(&self, records: &mut [R]) -> Result<u64> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let columns: Vec<String> = first
            .columns()
            .iter()
            .filter(|c| records.iter().any(|r| r.changed(c.name)))
            .map(|c| c.name.to_string())
            .collect();
        if columns.is_empty() {
            return Ok(0);
        }
        let rows: Vec<Vec<Value>> = records
            .iter()
            .map(|r| columns.iter().map(|c| r.get(c)).collect())
            .collect();
        let statement = Statement::Insert {
            table: first.table().to_string(),
            returning: all_column_names(first),
            columns,
            rows,
            on_conflict_do_nothing: false,
        };
        let result = self.execute(&statement).await?;
        for (record, row) in records.iter_mut().zip(result.rows.iter()) {
            copy_back(record, row);
        }
        Ok(result.rows_affected)
    }

    /// Insert `record`, skipping conflicting rows. Returns 0 when the insert
    /// did not emit a returning row.
    pub async fn insert_on_conflict_do_nothing<R: Record>(&self, record: &mut R) -> Result<u64> {
        let columns = changed_columns(record);
        if columns.is_empty() {
            return Ok(0);
        }
        let values: Vec<Value> = columns.iter().map(|c| record.get(c)).collect();
        let statement = Statement::Insert {
            table: record.table().to_string(),
            returning: all_column_names(record),
            columns,
            rows: vec![values],
            on_conflict_do_nothing: true,
        };
        let result = self.execute(&statement).await?;
        match result.rows.first() {
            Some(row) => {
                copy_back(record, row);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    /// Update the row whose primary key matches `record`'s current key
    /// values, in declared key order. Returns 0 when nothing changed.
    pub async fn update<R: Record>(&self, record: &mut R) -> Result<u64> {
        let columns = changed_columns(record);
        if columns.is_empty() {
            return Ok(0);
        }
        let assignments: Vec<(String, Value)> = columns
            .iter()
            .map(|c| (c.clone(), record.get(c)))
            .collect();
        let statement = Statement::Update {
            table: record.table().to_string(),
            assignments,
            filter: primary_key_predicate(record),
        };
        let result = self.execute(&statement).await?;
        clear_changed(record);
        Ok(result.rows_affected)
    }

    /// Insert or update `record`: behaves as [`insert`](Self::insert) when
    /// any primary-key field is marked changed or is null in a non-nullable
    /// column, as [`update`](Self::update) otherwise.
    pub async fn store<R: Record>(&self, record: &mut R) -> Result<u64> {
        let treat_as_insert = record
            .columns()
            .iter()
            .filter(|c| c.primary_key)
            .any(|c| record.changed(c.name) || (record.get(c.name).is_null() && !c.nullable));
        if treat_as_insert {
            self.insert(record).await
        } else {
            self.update(record).await
        }
    }

    /// Delete the row whose primary key matches `record`.
    pub async fn delete<R: Record>(&self, record: &R) -> Result<u64> {
        let statement = Statement::Delete {
            table: record.table().to_string(),
            filter: primary_key_predicate(record),
        };
        let result = self.execute(&statement).await?;
        Ok(result.rows_affected)
    }

    /// Delete every listed record by primary key (an OR over each record's
    /// key conjunction). An empty slice returns 0.
    pub async fn delete_all<R: Record>(&self, records: &[R]) -> Result<u64> {
        let Some(first) = records.first() else {
            return Ok(0);
        };
        let statement = Statement::Delete {
            table: first.table().to_string(),
            filter: Predicate::Or(records.iter().map(|r| primary_key_predicate(r)).collect()),
        };
        let result = self.execute(&statement).await?;
        Ok(result.rows_affected)
    }

    /// Whether a row with `record`'s primary key exists.
    pub async fn exists<R: Record>(&self, record: &R) -> Result<bool> {
        let key_columns: Vec<&str> = record
            .columns()
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect();
        let rows = self
            .select(record.table(), &key_columns, primary_key_predicate(record))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Project `columns` from `table` under `filter`.
    pub async fn select(
        &self,
        table: &str,
        columns: &[&str],
        filter: Predicate,
    ) -> Result<Rows> {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        let statement = Statement::Select {
            table: table.to_string(),
            columns: columns.clone(),
            filter,
        };
        let result = self.execute(&statement).await?;
        Ok(Rows::new(table, columns, result.rows))
    }

    /// Grouped row count: `SELECT group_by, COUNT(*) FROM table WHERE filter
    /// GROUP BY group_by`. Null group keys are rejected.
    pub async fn count(
        &self,
        table: &str,
        filter: Predicate,
        group_by: &str,
    ) -> Result<HashMap<Value, i64>> {
        let statement = Statement::Count {
            table: table.to_string(),
            filter,
            group_by: group_by.to_string(),
        };
        let result = self.execute(&statement).await?;
        let mut map = HashMap::with_capacity(result.rows.len());
        for row in result.rows {
            let key = row.get(0);
            if key.is_null() {
                return Err(Error::UnexpectedNullField {
                    field: format!("{table}.{group_by}"),
                });
            }
            let count = match row.get(1) {
                Value::Integer(n) => n,
                _ => 0,
            };
            map.insert(key, count);
        }
        Ok(map)
    }
}

fn all_column_names<R: Record + ?Sized>(record: &R) -> Vec<String> {
    record
        .columns()
        .iter()
        .map(|c| c.name.to_string())
        .collect()
}
