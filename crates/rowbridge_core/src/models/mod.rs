//! Data models for the rowbridge access layer.
//!
//! - `connection` - ConnectionConfig, PoolOptions, ConnectionStatus
//! - `query` - ColumnInfo, Param, ExecResult, CallSite
//! - `value` - RawValue, Value, Row

pub mod connection;
pub mod query;
pub mod value;

pub use connection::{ConnectionConfig, ConnectionConfigBuilder, ConnectionStatus, PoolOptions};
pub use query::{CallSite, ColumnInfo, ExecResult, Param};
pub use value::{RawValue, Row, Value};
