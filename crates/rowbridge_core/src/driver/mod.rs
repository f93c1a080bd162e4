//! The narrow driver interface the access layer consumes.
//!
//! A driver opens connections; a connection executes statements and hands
//! back cursors; a cursor yields raw cells one row at a time. Everything above
//! this module is driver-agnostic.
//!
//! - `postgres` - tokio-postgres / deadpool-postgres implementation
//! - `memory` - scripted in-memory driver for tests

use crate::error::DbError;
use crate::models::{ColumnInfo, ConnectionConfig, ExecResult, Param, RawValue};

use async_trait::async_trait;

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod postgres;

#[cfg(any(test, feature = "testing"))]
pub use memory::{MemoryConnection, MemoryDriver, ScriptedResult};
pub use postgres::{PostgresConnection, PostgresCursor, PostgresDriver};

/// A forward-only result cursor.
#[async_trait]
pub trait Cursor: Send {
    /// Column names and wire scan types, in result order.
    fn columns(&self) -> &[ColumnInfo];

    /// Scan the next row into `cells`, which has one slot per column.
    ///
    /// Returns `Ok(false)` once the cursor is exhausted.
    async fn next_row(&mut self, cells: &mut [RawValue]) -> Result<bool, DbError>;

    /// Release the cursor. Called exactly once, on every exit path.
    async fn close(&mut self) -> Result<(), DbError>;
}

/// A live connection (or pool) to the database.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Cursor type returned by [`Connection::query`].
    type Cursor: Cursor;

    /// Run a parameterized query and return its cursor.
    async fn query(&self, sql: &str, params: &[Param]) -> Result<Self::Cursor, DbError>;

    /// Run a parameterized statement without a result set.
    async fn execute(&self, sql: &str, params: &[Param]) -> Result<ExecResult, DbError>;

    /// Verify the connection is alive.
    async fn ping(&self) -> Result<(), DbError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), DbError>;
}

/// Opens connections from a configuration.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Connection type produced by this driver.
    type Connection: Connection;

    /// Open a connection.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, DbError>;
}
