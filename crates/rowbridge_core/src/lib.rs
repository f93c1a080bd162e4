//! Dynamically-typed row access for relational databases.
//!
//! This crate runs parameterized SQL and returns self-describing rows instead
//! of statically-typed records:
//!
//! - **error**: Error handling, including the distinguished no-rows signal
//! - **models**: Connection config, raw and normalized values, rows, call sites
//! - **driver**: The narrow driver interface and its PostgreSQL implementation
//! - **services**: Type normalization, row decoding, query logging, health checks
//! - **database**: The connection handle and query façade
//! - **logging**: Structured logging setup and log sinks
//!
//! ```no_run
//! use rowbridge_core::{params, ConnectionConfig, Database};
//!
//! # async fn run() -> Result<(), rowbridge_core::DbError> {
//! let db = Database::postgres(ConnectionConfig::from_env()?);
//! db.connect().await?;
//! let name = db.get_field("SELECT name FROM users WHERE id=?", "name", &params![1]).await?;
//! println!("{name}");
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod driver;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;

#[cfg(test)]
mod verification_tests;

pub use database::Database;
pub use error::DbError;
pub use logging::{LogSink, TracingSink};
pub use models::{
    CallSite, ColumnInfo, ConnectionConfig, ConnectionConfigBuilder, ConnectionStatus,
    ExecResult, Param, PoolOptions, RawValue, Row, Value,
};
pub use services::{AlertError, AlertSink, MonitorConfig, MonitorHandle, TelegramAlert};
