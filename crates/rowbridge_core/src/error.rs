//! Error types for the rowbridge access layer.
//!
//! A single error enum covers connection, query and decode failures, plus the
//! distinguished [`DbError::NoRows`] absence signal that callers are expected to
//! branch on.

use thiserror::Error;

/// Main error type returned by every public operation.
#[derive(Debug, Error)]
pub enum DbError {
    /// Establishing, using or closing the underlying connection failed.
    #[error("Connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The handle has no live connection (never connected, or closed).
    #[error("Not connected")]
    NotConnected,

    /// The query legitimately produced no data, or the requested field is absent.
    #[error("no rows in result set")]
    NoRows,

    /// The server rejected the statement.
    #[error("{message}")]
    Query {
        /// Server error message.
        message: String,
        /// Additional detail from the server.
        detail: Option<String>,
        /// Server hint.
        hint: Option<String>,
        /// SQLSTATE code (e.g., "42P01").
        code: Option<String>,
    },

    /// A result cell could not be scanned from the cursor.
    #[error("Decode error in column {column}: {message}")]
    Decode {
        /// Column being scanned when the failure happened.
        column: String,
        /// Human-readable error message.
        message: String,
    },

    /// Invalid configuration.
    #[error("Config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },
}

impl DbError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a new query error with server details.
    pub fn query(
        message: impl Into<String>,
        detail: Option<String>,
        hint: Option<String>,
        code: Option<String>,
    ) -> Self {
        Self::Query { message: message.into(), detail, hint, code }
    }

    /// Create a new decode error for a column.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode { column: column.into(), message: message.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    // ========== Methods ==========

    /// Check if this is the no-rows absence signal.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Self::NoRows)
    }

    /// Check if this error means the connection is unusable.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::NotConnected)
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection { .. } | Self::NotConnected => "Connection",
            Self::NoRows => "NoRows",
            Self::Query { .. } => "Query",
            Self::Decode { .. } => "Decode",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the caller.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connection { .. } => Some("Check that the database server is running"),
            Self::NotConnected => Some("Call connect() before issuing queries"),
            Self::Query { hint, .. } => hint.as_deref(),
            Self::Internal { .. } => Some("Please report this issue"),
            Self::NoRows | Self::Decode { .. } | Self::Config { .. } => None,
        }
    }

    /// Get the SQLSTATE code (if applicable).
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to DbError.
impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let code = db_err.code().code();

            // Connection exceptions (08xxx)
            if code.starts_with("08") {
                return DbError::Connection { message, source: Some(Box::new(err)) };
            }
            return DbError::Query {
                message,
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                code: Some(code.to_string()),
            };
        }

        if err.is_closed() {
            return DbError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        DbError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from deadpool pool errors to DbError.
impl From<deadpool_postgres::PoolError> for DbError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(e) => DbError::from(e),
            other => DbError::Connection {
                message: format!("Failed to acquire connection: {other}"),
                source: Some(Box::new(other)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_rows_is_distinguished() {
        assert!(DbError::NoRows.is_no_rows());
        assert!(!DbError::internal("boom").is_no_rows());
        assert!(!DbError::decode("id", "bad").is_no_rows());
        assert_eq!(DbError::NoRows.to_string(), "no rows in result set");
    }

    #[test]
    fn test_categories_and_hints() {
        assert_eq!(DbError::connection("refused").category(), "Connection");
        assert_eq!(DbError::NotConnected.category(), "Connection");
        assert!(DbError::NotConnected.is_connection_lost());
        assert!(DbError::connection("refused").hint().is_some());
        assert!(DbError::NoRows.hint().is_none());

        let err = DbError::query(
            "relation \"t\" does not exist",
            None,
            Some("create it first".to_string()),
            Some("42P01".to_string()),
        );
        assert_eq!(err.category(), "Query");
        assert_eq!(err.sql_state(), Some("42P01"));
        assert_eq!(err.hint(), Some("create it first"));
        assert_eq!(err.to_string(), "relation \"t\" does not exist");
    }

    #[test]
    fn test_decode_error_names_column() {
        let err = DbError::decode("price", "invalid numeric header");
        assert_eq!(err.to_string(), "Decode error in column price: invalid numeric header");
    }
}
