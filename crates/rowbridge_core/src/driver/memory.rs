//! Scripted in-memory driver.
//!
//! Results are queued up front and handed out in order, one per `query` call.
//! The connection records every statement it sees and how many cursors were
//! closed, so tests can assert on both.

use super::{Connection, Cursor, Driver};
use crate::error::DbError;
use crate::models::{ColumnInfo, ConnectionConfig, ExecResult, Param, RawValue};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted response to a `query` call.
#[derive(Debug, Clone)]
pub enum ScriptedResult {
    /// A result set. Scanning fails when it reaches `fail_at_row`, if set.
    Rows {
        columns: Vec<ColumnInfo>,
        rows: Vec<Vec<RawValue>>,
        fail_at_row: Option<usize>,
    },
    /// The query itself is rejected.
    QueryError(String),
}

impl ScriptedResult {
    /// A result set from `(name, scan_type)` pairs and row cells.
    pub fn rows(columns: &[(&str, &str)], rows: Vec<Vec<RawValue>>) -> Self {
        Self::Rows {
            columns: columns.iter().map(|(n, t)| ColumnInfo::new(*n, *t)).collect(),
            rows,
            fail_at_row: None,
        }
    }

    /// A result set with columns but no rows.
    pub fn empty(columns: &[(&str, &str)]) -> Self {
        Self::rows(columns, Vec::new())
    }

    /// Make scanning fail at the given zero-based row.
    pub fn failing_at(self, row: usize) -> Self {
        match self {
            Self::Rows { columns, rows, .. } => Self::Rows { columns, rows, fail_at_row: Some(row) },
            other => other,
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    results: Mutex<VecDeque<ScriptedResult>>,
    exec_results: Mutex<VecDeque<Result<ExecResult, String>>>,
    ping_failure: Mutex<Option<String>>,
    statements: Mutex<Vec<(String, Vec<Param>)>>,
    cursors_closed: AtomicUsize,
    pings: AtomicUsize,
    closed: AtomicBool,
}

/// Driver handing out one shared [`MemoryConnection`].
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    connection: MemoryConnection,
    connect_error: Option<String>,
}

impl MemoryDriver {
    /// Create a driver with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// A driver whose `connect` always fails.
    pub fn failing(message: impl Into<String>) -> Self {
        Self { connection: MemoryConnection::default(), connect_error: Some(message.into()) }
    }

    /// The connection `connect` will return; script and inspect it here.
    pub fn connection(&self) -> &MemoryConnection {
        &self.connection
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    type Connection = MemoryConnection;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<MemoryConnection, DbError> {
        match &self.connect_error {
            Some(message) => Err(DbError::connection(message.clone())),
            None => Ok(self.connection.clone()),
        }
    }
}

/// In-memory connection; clones share the same script and history.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl MemoryConnection {
    /// Queue a response for the next `query` call.
    pub fn push_result(&self, result: ScriptedResult) -> &Self {
        self.shared.results.lock().push_back(result);
        self
    }

    /// Queue a response for the next `execute` call.
    pub fn push_exec(&self, result: ExecResult) -> &Self {
        self.shared.exec_results.lock().push_back(Ok(result));
        self
    }

    /// Queue a failure for the next `execute` call.
    pub fn push_exec_error(&self, message: impl Into<String>) -> &Self {
        self.shared.exec_results.lock().push_back(Err(message.into()));
        self
    }

    /// Make every ping fail with `message`, or succeed again with `None`.
    pub fn set_ping_failure(&self, message: Option<&str>) {
        *self.shared.ping_failure.lock() = message.map(String::from);
    }

    /// Statements seen so far, in order, with their parameters.
    pub fn statements(&self) -> Vec<(String, Vec<Param>)> {
        self.shared.statements.lock().clone()
    }

    /// Number of cursors released.
    pub fn cursors_closed(&self) -> usize {
        self.shared.cursors_closed.load(Ordering::SeqCst)
    }

    /// Number of pings received.
    pub fn pings(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<(), DbError> {
        if self.is_closed() {
            return Err(DbError::connection("connection closed"));
        }
        Ok(())
    }

    fn record(&self, sql: &str, params: &[Param]) {
        self.shared.statements.lock().push((sql.to_string(), params.to_vec()));
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    type Cursor = MemoryCursor;

    async fn query(&self, sql: &str, params: &[Param]) -> Result<MemoryCursor, DbError> {
        self.check_open()?;
        self.record(sql, params);

        let scripted = self.shared.results.lock().pop_front();
        match scripted {
            Some(ScriptedResult::QueryError(message)) => {
                Err(DbError::query(message, None, None, None))
            }
            Some(ScriptedResult::Rows { columns, rows, fail_at_row }) => Ok(MemoryCursor {
                columns,
                rows: rows.into(),
                fail_at_row,
                position: 0,
                shared: self.shared.clone(),
            }),
            None => Ok(MemoryCursor {
                columns: Vec::new(),
                rows: VecDeque::new(),
                fail_at_row: None,
                position: 0,
                shared: self.shared.clone(),
            }),
        }
    }

    async fn execute(&self, sql: &str, params: &[Param]) -> Result<ExecResult, DbError> {
        self.check_open()?;
        self.record(sql, params);

        let scripted = self.shared.exec_results.lock().pop_front();
        match scripted {
            Some(Ok(result)) => Ok(result),
            Some(Err(message)) => Err(DbError::query(message, None, None, None)),
            None => Ok(ExecResult::default()),
        }
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.shared.pings.fetch_add(1, Ordering::SeqCst);
        self.check_open()?;
        match self.shared.ping_failure.lock().clone() {
            Some(message) => Err(DbError::connection(message)),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Cursor over a scripted result set.
#[derive(Debug)]
pub struct MemoryCursor {
    columns: Vec<ColumnInfo>,
    rows: VecDeque<Vec<RawValue>>,
    fail_at_row: Option<usize>,
    position: usize,
    shared: Arc<Shared>,
}

#[async_trait]
impl Cursor for MemoryCursor {
    fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    async fn next_row(&mut self, cells: &mut [RawValue]) -> Result<bool, DbError> {
        if self.fail_at_row == Some(self.position) {
            let column = self.columns.first().map(|c| c.name.as_str()).unwrap_or("?");
            return Err(DbError::decode(column, "scripted scan failure"));
        }
        let Some(row) = self.rows.pop_front() else {
            return Ok(false);
        };
        for (slot, value) in cells.iter_mut().zip(row) {
            *slot = value;
        }
        self.position += 1;
        Ok(true)
    }

    async fn close(&mut self) -> Result<(), DbError> {
        self.shared.cursors_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
