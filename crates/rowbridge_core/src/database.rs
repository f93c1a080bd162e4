//! The database handle: connection lifecycle and the query façade.
//!
//! Every read shape is built on the same path: log the call, run the query,
//! decode the cursor into rows. Each shape comes in two forms: a `*_at`
//! variant taking an explicit [`CallSite`], and a convenience variant that
//! records the caller's own location.

use crate::driver::{Connection, Driver, PostgresDriver};
use crate::error::DbError;
use crate::logging::LogSink;
use crate::models::{CallSite, ConnectionConfig, ConnectionStatus, ExecResult, Param, Row, Value};
use crate::services::alert::{AlertError, AlertSink, TelegramAlert};
use crate::services::decode::decode_rows;
use crate::services::health::{HealthMonitor, MonitorConfig, MonitorHandle};
use crate::services::query_log::QueryLog;

use parking_lot::RwLock;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A handle on one database.
///
/// Holds at most one live connection, created by [`connect`](Self::connect)
/// and released by [`close`](Self::close). The handle never reconnects on its
/// own. All methods take `&self`, so a handle can be shared behind an `Arc`.
pub struct Database<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    conn: RwLock<Option<Arc<D::Connection>>>,
    status: RwLock<ConnectionStatus>,
    logger: RwLock<Option<Arc<dyn LogSink>>>,
    alert: RwLock<Option<Arc<dyn AlertSink>>>,
    debug: AtomicBool,
    query_log: QueryLog,
}

impl Database<PostgresDriver> {
    /// Create a PostgreSQL-backed handle.
    pub fn postgres(config: ConnectionConfig) -> Self {
        Self::new(PostgresDriver, config)
    }
}

impl<D: Driver> Database<D> {
    /// Create a disconnected handle.
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            conn: RwLock::new(None),
            status: RwLock::new(ConnectionStatus::Disconnected),
            logger: RwLock::new(None),
            alert: RwLock::new(None),
            debug: AtomicBool::new(false),
            query_log: QueryLog::new(),
        }
    }

    // ========== Connection Lifecycle ==========

    /// Open the connection. A no-op when already connected.
    pub async fn connect(&self) -> Result<(), DbError> {
        if self.conn.read().is_some() {
            tracing::debug!("Already connected");
            return Ok(());
        }

        self.config.validate()?;
        tracing::debug!(url = %self.config.display_url(), "Connecting");

        let conn = match self.driver.connect(&self.config).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(url = %self.config.display_url(), error = %e, "Connection failed");
                return Err(e);
            }
        };

        *self.conn.write() = Some(Arc::new(conn));
        *self.status.write() = ConnectionStatus::Connected;
        tracing::info!(url = %self.config.display_url(), "Connected");
        Ok(())
    }

    /// Close the connection. Later operations fail with [`DbError::NotConnected`].
    ///
    /// A running health monitor keeps its own reference and is not stopped.
    pub async fn close(&self) -> Result<(), DbError> {
        let conn = self.conn.write().take().ok_or(DbError::NotConnected)?;
        *self.status.write() = ConnectionStatus::Closed;
        tracing::info!(url = %self.config.display_url(), "Closing connection");
        conn.close().await
    }

    /// Verify the connection is alive.
    pub async fn ping(&self) -> Result<(), DbError> {
        self.connection()?.ping().await
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ConnectionStatus {
        *self.status.read()
    }

    /// Configuration this handle connects with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn connection(&self) -> Result<Arc<D::Connection>, DbError> {
        self.conn.read().clone().ok_or(DbError::NotConnected)
    }

    // ========== Sinks and Flags ==========

    /// Emit a diagnostic for every cell whose column type is not recognized.
    pub fn enable_debug(&self) {
        self.debug.store(true, Ordering::Relaxed);
    }

    /// Check if debug diagnostics are on.
    pub fn is_debug(&self) -> bool {
        self.debug.load(Ordering::Relaxed)
    }

    /// Send query logs and failure reports to `logger`.
    pub fn attach_logger(&self, logger: Arc<dyn LogSink>) {
        *self.logger.write() = Some(logger);
    }

    /// Send health alerts to `alert`.
    pub fn attach_alerting(&self, alert: Arc<dyn AlertSink>) {
        *self.alert.write() = Some(alert);
    }

    /// Send health alerts to a Telegram chat.
    pub fn enable_telegram(&self, bot_token: impl Into<String>, chat_id: i64) -> Result<(), AlertError> {
        self.attach_alerting(Arc::new(TelegramAlert::new(bot_token, chat_id)?));
        Ok(())
    }

    /// Leave the next query out of the log. Chainable.
    ///
    /// Only the very next query or statement is affected, whether or not a
    /// logger is attached. See [`QueryLog`] for the concurrency caveat.
    pub fn skip_next_query_log(&self) -> &Self {
        self.query_log.skip_next();
        self
    }

    fn logger(&self) -> Option<Arc<dyn LogSink>> {
        self.logger.read().clone()
    }

    // ========== Query Façade ==========
    //
    // The plain methods log their caller as `file:line` only; Rust has no
    // runtime view of the calling function. The `*_at` variants take a
    // `CallSite`, and `call_site!()` fills in `file:line (function)`.

    /// Run a query and return every row; empty when nothing matched.
    ///
    /// Logged with a `file:line` call site. Use [`get_rows_at`](Self::get_rows_at)
    /// with [`call_site!`](crate::call_site) to log the calling function as well.
    #[track_caller]
    pub fn get_rows<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> impl Future<Output = Result<Vec<Row>, DbError>> + 'a {
        let site = CallSite::caller();
        async move { self.get_rows_at(&site, sql, params).await }
    }

    /// [`get_rows`](Self::get_rows) with an explicit call site.
    pub async fn get_rows_at(
        &self,
        site: &CallSite,
        sql: &str,
        params: &[Param],
    ) -> Result<Vec<Row>, DbError> {
        let logger = self.logger();
        self.query_log.record(logger.as_deref(), site, sql, params);

        let conn = self.connection()?;
        let start = Instant::now();
        let mut cursor = conn.query(sql, params).await?;

        let diagnostics = if self.is_debug() { logger.as_deref() } else { None };
        let rows = decode_rows(&mut cursor, diagnostics).await?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            row_count = rows.len(),
            "Query completed"
        );
        Ok(rows)
    }

    /// Run a query and return its first row, or [`DbError::NoRows`].
    ///
    /// Logged with a `file:line` call site; see [`get_row_at`](Self::get_row_at).
    #[track_caller]
    pub fn get_row<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> impl Future<Output = Result<Row, DbError>> + 'a {
        let site = CallSite::caller();
        async move { self.get_row_at(&site, sql, params).await }
    }

    /// [`get_row`](Self::get_row) with an explicit call site.
    pub async fn get_row_at(
        &self,
        site: &CallSite,
        sql: &str,
        params: &[Param],
    ) -> Result<Row, DbError> {
        self.get_rows_at(site, sql, params).await?.into_iter().next().ok_or(DbError::NoRows)
    }

    /// Run a query and return one field of its first row.
    ///
    /// An empty result and a missing field both yield [`DbError::NoRows`].
    /// Logged with a `file:line` call site; see [`get_field_at`](Self::get_field_at).
    #[track_caller]
    pub fn get_field<'a>(
        &'a self,
        sql: &'a str,
        field: &'a str,
        params: &'a [Param],
    ) -> impl Future<Output = Result<Value, DbError>> + 'a {
        let site = CallSite::caller();
        async move { self.get_field_at(&site, sql, field, params).await }
    }

    /// [`get_field`](Self::get_field) with an explicit call site.
    pub async fn get_field_at(
        &self,
        site: &CallSite,
        sql: &str,
        field: &str,
        params: &[Param],
    ) -> Result<Value, DbError> {
        let mut row = self.get_row_at(site, sql, params).await?;
        row.remove(field).ok_or(DbError::NoRows)
    }

    /// Run a procedure-style query that must return at least one row.
    ///
    /// # Panics
    ///
    /// Panics when the query succeeds with zero rows. Use
    /// [`get_row`](Self::get_row) when an empty result is expected.
    #[track_caller]
    pub fn call<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> impl Future<Output = Result<Row, DbError>> + 'a {
        let site = CallSite::caller();
        async move { self.call_at(&site, sql, params).await }
    }

    /// [`call`](Self::call) with an explicit call site.
    ///
    /// # Panics
    ///
    /// Panics when the query succeeds with zero rows.
    pub async fn call_at(
        &self,
        site: &CallSite,
        sql: &str,
        params: &[Param],
    ) -> Result<Row, DbError> {
        match self.get_rows_at(site, sql, params).await?.into_iter().next() {
            Some(row) => Ok(row),
            None => panic!("call at {site} returned no rows: {sql}"),
        }
    }

    /// Run a statement without decoding a result set.
    ///
    /// Logged with a `file:line` call site; see [`execute_at`](Self::execute_at).
    #[track_caller]
    pub fn execute<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Param],
    ) -> impl Future<Output = Result<ExecResult, DbError>> + 'a {
        let site = CallSite::caller();
        async move { self.execute_at(&site, sql, params).await }
    }

    /// [`execute`](Self::execute) with an explicit call site.
    pub async fn execute_at(
        &self,
        site: &CallSite,
        sql: &str,
        params: &[Param],
    ) -> Result<ExecResult, DbError> {
        let logger = self.logger();
        self.query_log.record(logger.as_deref(), site, sql, params);

        let result = self.connection()?.execute(sql, params).await?;
        tracing::debug!(rows_affected = result.rows_affected, "Statement completed");
        Ok(result)
    }

    // ========== Health ==========

    /// Start a background liveness check with the sinks attached right now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_health_monitor(&self, config: MonitorConfig) -> Result<MonitorHandle, DbError> {
        Ok(self.health_monitor(config)?.spawn())
    }

    /// Report a connectivity failure through the attached sinks.
    pub async fn notify_disconnected(&self, err: &DbError) -> Result<(), DbError> {
        self.health_monitor(MonitorConfig::default())?.report(err).await;
        Ok(())
    }

    fn health_monitor(&self, config: MonitorConfig) -> Result<HealthMonitor<D::Connection>, DbError> {
        Ok(HealthMonitor::new(self.connection()?, config)
            .with_logger(self.logger())
            .with_alert(self.alert.read().clone()))
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("url", &self.config.display_url())
            .field("status", &self.status())
            .field("debug", &self.is_debug())
            .finish()
    }
}
