//! In-memory query-source doubles shared by the integration tests.
//!
//! `MemStore` is a tiny table store with primary-key enforcement,
//! Postgres-style duplicate-key messages, and undo-log rollback, exposed both
//! as a blocking source and as a reactive source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use turnstile::core::error::{Error, Result};
use turnstile::sql::{
    source::predicate_matches, BlockingSession, BlockingSource, Column, ExecResult,
    IsolationLevel, Record, ReactiveSession, ReactiveSource, Row, Statement, Value,
};

type RowMap = HashMap<String, Value>;

struct Table {
    primary_key: Vec<String>,
    rows: Vec<RowMap>,
}

enum Undo {
    Insert { table: String, key: Vec<Value> },
    Update { table: String, key: Vec<Value>, prev: RowMap },
    Delete { table: String, row: RowMap },
}

/// Shared in-memory database.
#[derive(Default)]
pub struct MemStore {
    tables: Mutex<HashMap<String, Table>>,
    last_isolation: Mutex<Option<IsolationLevel>>,
    last_read_only: Mutex<Option<bool>>,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_table(self: Arc<Self>, name: &str, primary_key: &[&str]) -> Arc<Self> {
        self.tables.lock().insert(
            name.to_string(),
            Table {
                primary_key: primary_key.iter().map(|c| (*c).to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    pub fn last_isolation(&self) -> Option<IsolationLevel> {
        *self.last_isolation.lock()
    }

    pub fn last_read_only(&self) -> Option<bool> {
        *self.last_read_only.lock()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .get(table)
            .map(|t| t.rows.len())
            .unwrap_or(0)
    }

    fn apply(&self, statement: &Statement, undo: &mut Vec<Undo>) -> Result<ExecResult> {
        let mut tables = self.tables.lock();
        match statement {
            Statement::Insert {
                table,
                columns,
                rows,
                returning,
                on_conflict_do_nothing,
            } => {
                let table_state = lookup(&mut tables, table)?;
                let mut result = ExecResult::default();
                for values in rows {
                    let mut row: RowMap = columns
                        .iter()
                        .cloned()
                        .zip(values.iter().cloned())
                        .collect();
                    generate_missing_keys(table_state, &mut row);
                    let key = key_of(&table_state.primary_key, &row);
                    let conflict = table_state
                        .rows
                        .iter()
                        .any(|existing| key_of(&table_state.primary_key, existing) == key);
                    if conflict {
                        if *on_conflict_do_nothing {
                            continue;
                        }
                        return Err(Error::Driver(duplicate_key_message(
                            table,
                            &table_state.primary_key,
                            &key,
                        )));
                    }
                    result.rows.push(project(&row, returning));
                    table_state.rows.push(row);
                    undo.push(Undo::Insert {
                        table: table.clone(),
                        key,
                    });
                    result.rows_affected += 1;
                }
                Ok(result)
            }
            Statement::Update {
                table,
                assignments,
                filter,
            } => {
                let table_state = lookup(&mut tables, table)?;
                let mut affected = 0;
                for row in table_state.rows.iter_mut() {
                    let matched = predicate_matches(filter, &|field| {
                        row.get(field).cloned().unwrap_or(Value::Null)
                    });
                    if matched {
                        undo.push(Undo::Update {
                            table: table.clone(),
                            key: key_of(&table_state.primary_key, row),
                            prev: row.clone(),
                        });
                        for (column, value) in assignments {
                            row.insert(column.clone(), value.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(ExecResult {
                    rows_affected: affected,
                    rows: Vec::new(),
                })
            }
            Statement::Delete { table, filter } => {
                let table_state = lookup(&mut tables, table)?;
                let mut kept = Vec::with_capacity(table_state.rows.len());
                let mut affected = 0;
                for row in table_state.rows.drain(..) {
                    let matched = predicate_matches(filter, &|field| {
                        row.get(field).cloned().unwrap_or(Value::Null)
                    });
                    if matched {
                        undo.push(Undo::Delete {
                            table: table.clone(),
                            row: row.clone(),
                        });
                        affected += 1;
                    } else {
                        kept.push(row);
                    }
                }
                table_state.rows = kept;
                Ok(ExecResult {
                    rows_affected: affected,
                    rows: Vec::new(),
                })
            }
            Statement::Select {
                table,
                columns,
                filter,
            } => {
                let table_state = lookup(&mut tables, table)?;
                let rows = table_state
                    .rows
                    .iter()
                    .filter(|row| {
                        predicate_matches(filter, &|field| {
                            row.get(field).cloned().unwrap_or(Value::Null)
                        })
                    })
                    .map(|row| project(row, columns))
                    .collect();
                Ok(ExecResult {
                    rows_affected: 0,
                    rows,
                })
            }
            Statement::Count {
                table,
                filter,
                group_by,
            } => {
                let table_state = lookup(&mut tables, table)?;
                let mut groups: HashMap<Value, i64> = HashMap::new();
                for row in &table_state.rows {
                    let matched = predicate_matches(filter, &|field| {
                        row.get(field).cloned().unwrap_or(Value::Null)
                    });
                    if matched {
                        let key = row.get(group_by).cloned().unwrap_or(Value::Null);
                        *groups.entry(key).or_insert(0) += 1;
                    }
                }
                let rows = groups
                    .into_iter()
                    .map(|(key, count)| Row::new(vec![key, Value::Integer(count)]))
                    .collect();
                Ok(ExecResult {
                    rows_affected: 0,
                    rows,
                })
            }
        }
    }

    fn undo(&self, entries: Vec<Undo>) {
        let mut tables = self.tables.lock();
        for entry in entries.into_iter().rev() {
            match entry {
                Undo::Insert { table, key } => {
                    if let Some(table_state) = tables.get_mut(&table) {
                        let pk = table_state.primary_key.clone();
                        table_state.rows.retain(|row| key_of(&pk, row) != key);
                    }
                }
                Undo::Update { table, key, prev } => {
                    if let Some(table_state) = tables.get_mut(&table) {
                        let pk = table_state.primary_key.clone();
                        for row in table_state.rows.iter_mut() {
                            if key_of(&pk, row) == key {
                                *row = prev;
                                break;
                            }
                        }
                    }
                }
                Undo::Delete { table, row } => {
                    if let Some(table_state) = tables.get_mut(&table) {
                        table_state.rows.push(row);
                    }
                }
            }
        }
    }
}

fn lookup<'t>(
    tables: &'t mut HashMap<String, Table>,
    name: &str,
) -> Result<&'t mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| Error::Driver(format!("relation \"{name}\" does not exist")))
}

fn generate_missing_keys(table: &Table, row: &mut RowMap) {
    for pk in &table.primary_key {
        let missing = row.get(pk).map(Value::is_null).unwrap_or(true);
        if missing {
            let next = table
                .rows
                .iter()
                .filter_map(|r| match r.get(pk) {
                    Some(Value::Integer(i)) => Some(*i),
                    _ => None,
                })
                .max()
                .unwrap_or(0)
                + 1;
            row.insert(pk.clone(), Value::Integer(next));
        }
    }
}

fn key_of(primary_key: &[String], row: &RowMap) -> Vec<Value> {
    primary_key
        .iter()
        .map(|pk| row.get(pk).cloned().unwrap_or(Value::Null))
        .collect()
}

fn project(row: &RowMap, columns: &[String]) -> Row {
    Row::new(
        columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or(Value::Null))
            .collect(),
    )
}

fn duplicate_key_message(table: &str, primary_key: &[String], key: &[Value]) -> String {
    let columns = primary_key.join(", ");
    let values = key.iter().map(value_text).collect::<Vec<_>>().join(", ");
    format!(
        "duplicate key value violates unique constraint \"{table}_pkey\": \
         Key ({columns})=({values}) already exists."
    )
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(r) => r.to_string(),
        Value::Text(s) => s.clone(),
        Value::Bytes(_) => "<bytes>".to_string(),
    }
}

/// Blocking session over the shared store.
pub struct MemSession {
    store: Arc<MemStore>,
    undo: Vec<Undo>,
}

impl MemSession {
    fn new(store: Arc<MemStore>) -> Self {
        Self {
            store,
            undo: Vec::new(),
        }
    }
}

impl BlockingSession for MemSession {
    fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        *self.store.last_isolation.lock() = Some(level);
        Ok(())
    }

    fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        *self.store.last_read_only.lock() = Some(read_only);
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.undo.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.undo.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let entries = std::mem::take(&mut self.undo);
        self.store.undo(entries);
        Ok(())
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecResult> {
        self.store.apply(statement, &mut self.undo)
    }
}

/// Blocking source handing out sessions over the shared store.
pub struct MemBlockingSource {
    store: Arc<MemStore>,
}

impl MemBlockingSource {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }
}

impl BlockingSource for MemBlockingSource {
    fn open(&self) -> Result<Box<dyn BlockingSession>> {
        Ok(Box::new(MemSession::new(Arc::clone(&self.store))))
    }
}

/// Reactive session delegating to the same store.
pub struct MemReactiveSession {
    inner: MemSession,
}

#[async_trait]
impl ReactiveSession for MemReactiveSession {
    async fn set_isolation(&mut self, level: IsolationLevel) -> Result<()> {
        self.inner.set_isolation(level)
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ExecResult> {
        self.inner.execute(statement)
    }

    async fn commit(&mut self) -> Result<()> {
        self.inner.commit()
    }

    async fn rollback(&mut self) -> Result<()> {
        self.inner.rollback()
    }
}

/// Reactive source publishing one session per transaction.
pub struct MemReactiveSource {
    store: Arc<MemStore>,
}

impl MemReactiveSource {
    pub fn new(store: Arc<MemStore>) -> Self {
        Self { store }
    }
}

impl ReactiveSource for MemReactiveSource {
    fn begin(&self) -> oneshot::Receiver<Result<Box<dyn ReactiveSession>>> {
        let (tx, rx) = oneshot::channel();
        let mut inner = MemSession::new(Arc::clone(&self.store));
        let session = inner.begin().map(|()| {
            Box::new(MemReactiveSession { inner }) as Box<dyn ReactiveSession>
        });
        let _ = tx.send(session);
        rx
    }
}

/// Reactive source whose transaction publisher completes without a value.
pub struct BrokenReactiveSource;

impl ReactiveSource for BrokenReactiveSource {
    fn begin(&self) -> oneshot::Receiver<Result<Box<dyn ReactiveSession>>> {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        rx
    }
}

const USER_COLUMNS: &[Column] = &[
    Column::primary_key("id"),
    Column::new("username").not_null(),
    Column::new("email").not_null(),
    Column::new("deactivated").not_null(),
    Column::new("created"),
];

/// Test record over the `users` table.
#[derive(Debug, Clone)]
pub struct UserRecord {
    values: HashMap<&'static str, Value>,
    changed: HashMap<&'static str, bool>,
}

impl UserRecord {
    /// A fully-populated record with every field marked changed.
    pub fn new(id: i64, username: &str, email: &str) -> Self {
        let mut record = Self::blank();
        record.set("id", Value::Integer(id));
        record.set("username", Value::Text(username.to_string()));
        record.set("email", Value::Text(email.to_string()));
        record.set("deactivated", Value::Bool(false));
        record.set("created", Value::Integer(1_700_000_000));
        record
    }

    /// A record without a key; the server generates one on insert.
    pub fn anonymous(username: &str, email: &str) -> Self {
        let mut record = Self::blank();
        record.set("username", Value::Text(username.to_string()));
        record.set("email", Value::Text(email.to_string()));
        record.set("deactivated", Value::Bool(false));
        record
    }

    fn blank() -> Self {
        Self {
            values: HashMap::new(),
            changed: HashMap::new(),
        }
    }

    pub fn id(&self) -> Value {
        self.get("id")
    }

    pub fn has_changes(&self) -> bool {
        USER_COLUMNS.iter().any(|c| self.changed(c.name))
    }
}

impl Record for UserRecord {
    fn table(&self) -> &str {
        "users"
    }

    fn columns(&self) -> &[Column] {
        USER_COLUMNS
    }

    fn get(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    fn set(&mut self, column: &str, value: Value) {
        if let Some(col) = USER_COLUMNS.iter().find(|c| c.name == column) {
            self.values.insert(col.name, value);
            self.changed.insert(col.name, true);
        }
    }

    fn changed(&self, column: &str) -> bool {
        self.changed.get(column).copied().unwrap_or(false)
    }

    fn set_changed(&mut self, column: &str, changed: bool) {
        if let Some(col) = USER_COLUMNS.iter().find(|c| c.name == column) {
            self.changed.insert(col.name, changed);
        }
    }
}

/// Fresh store seeded with the `users` table.
pub fn users_store() -> Arc<MemStore> {
    MemStore::new().with_table("users", &["id"])
}
