//! Connection configuration and status models.

use crate::error::DbError;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifecycle of a connection handle.
///
/// A handle starts disconnected, becomes connected on an explicit `connect`
/// and ends closed on an explicit `close`. There is no automatic reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection has been established yet
    #[default]
    Disconnected,
    /// Live connection
    Connected,
    /// Closed by the caller
    Closed,
}

impl ConnectionStatus {
    /// Check if the connection is live.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

/// Pool sizing and timeouts handed to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolOptions {
    /// Maximum number of pooled connections
    pub max_size: usize,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u32,
    /// How long to wait for a free connection, in seconds
    pub wait_timeout_secs: u32,
    /// Application name reported to the server
    pub application_name: String,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_size: 4,
            connect_timeout_secs: 10,
            wait_timeout_secs: 30,
            application_name: "rowbridge".to_string(),
        }
    }
}

impl PoolOptions {
    /// Connection timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs as u64)
    }

    /// Pool wait timeout as a duration.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs as u64)
    }
}

/// Default character set applied when none is configured.
pub const DEFAULT_CHARSET: &str = "UTF8";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5432;

/// Everything needed to open a connection.
///
/// The password is never serialized, and `Debug` redacts it.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Server hostname or IP
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Login username
    pub user: String,
    /// Login password
    #[serde(default, skip_serializing)]
    pub password: String,
    /// Database name
    pub database: String,
    /// Character set (client encoding)
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Pool options
    #[serde(default)]
    pub pool: PoolOptions,
}

const REDACTED: &str = "<redacted>";

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("pool", &self.pool)
            .finish()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_charset() -> String {
    DEFAULT_CHARSET.to_string()
}

impl ConnectionConfig {
    /// Create a configuration with required fields.
    pub fn new(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            charset: DEFAULT_CHARSET.to_string(),
            pool: PoolOptions::default(),
        }
    }

    /// Create a builder for complex configurations.
    pub fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::default()
    }

    /// Read the configuration from `ROWBRIDGE_*` environment variables.
    ///
    /// `ROWBRIDGE_HOST`, `ROWBRIDGE_USER` and `ROWBRIDGE_DATABASE` are required;
    /// `ROWBRIDGE_PORT`, `ROWBRIDGE_PASSWORD`, `ROWBRIDGE_CHARSET` and
    /// `ROWBRIDGE_POOL_SIZE` are optional.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| DbError::config(format!("{key} is not set")))
        };

        let mut builder = Self::builder()
            .host(required("ROWBRIDGE_HOST")?)
            .user(required("ROWBRIDGE_USER")?)
            .database(required("ROWBRIDGE_DATABASE")?)
            .password(lookup("ROWBRIDGE_PASSWORD").unwrap_or_default());

        if let Some(port) = lookup("ROWBRIDGE_PORT") {
            let port = port
                .parse()
                .map_err(|_| DbError::config(format!("ROWBRIDGE_PORT is not a port: {port}")))?;
            builder = builder.port(port);
        }
        if let Some(charset) = lookup("ROWBRIDGE_CHARSET") {
            builder = builder.charset(charset);
        }
        if let Some(size) = lookup("ROWBRIDGE_POOL_SIZE") {
            let size = size.parse().map_err(|_| {
                DbError::config(format!("ROWBRIDGE_POOL_SIZE is not a number: {size}"))
            })?;
            builder = builder.max_pool_size(size);
        }
        builder.build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), DbError> {
        if self.host.is_empty() {
            return Err(DbError::config("Host is required"));
        }
        if self.user.is_empty() {
            return Err(DbError::config("User is required"));
        }
        if self.database.is_empty() || self.database.len() > 63 {
            return Err(DbError::config("Database name must be 1-63 characters"));
        }
        if self.charset.is_empty() {
            return Err(DbError::config("Charset must not be empty"));
        }
        if self.pool.max_size == 0 {
            return Err(DbError::config("Pool size must be at least 1"));
        }
        Ok(())
    }

    /// Get the display address (without password).
    pub fn display_url(&self) -> String {
        format!("postgresql://{}@{}:{}/{}", self.user, self.host, self.port, self.database)
    }
}

/// Builder for ConnectionConfig.
#[derive(Default)]
pub struct ConnectionConfigBuilder {
    host: Option<String>,
    port: u16,
    user: Option<String>,
    password: String,
    database: Option<String>,
    charset: Option<String>,
    pool: PoolOptions,
}

impl std::fmt::Debug for ConnectionConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfigBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &REDACTED)
            .field("database", &self.database)
            .field("charset", &self.charset)
            .field("pool", &self.pool)
            .finish()
    }
}

impl ConnectionConfigBuilder {
    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the database name.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Set the maximum pool size.
    pub fn max_pool_size(mut self, size: usize) -> Self {
        self.pool.max_size = size;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout_secs(mut self, secs: u32) -> Self {
        self.pool.connect_timeout_secs = secs;
        self
    }

    /// Set the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.pool.application_name = name.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<ConnectionConfig, DbError> {
        let config = ConnectionConfig {
            host: self.host.ok_or_else(|| DbError::config("Host is required"))?,
            port: if self.port == 0 { DEFAULT_PORT } else { self.port },
            user: self.user.ok_or_else(|| DbError::config("User is required"))?,
            password: self.password,
            database: self.database.ok_or_else(|| DbError::config("Database is required"))?,
            charset: self.charset.unwrap_or_else(default_charset),
            pool: self.pool,
        };
        config.validate()?;
        Ok(config)
    }
}
