//! Periodic connection health checks.
//!
//! A monitor sleeps for one interval, pings the connection and, on failure,
//! reports through the log sink and the alert sink. It never closes or
//! reconnects the connection and never stops on its own; stop it through the
//! [`MonitorHandle`].

use crate::driver::Connection;
use crate::error::DbError;
use crate::logging::LogSink;
use crate::services::alert::AlertSink;

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time between liveness checks.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(60);

/// Health monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Time between liveness checks
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval: DEFAULT_PING_INTERVAL }
    }
}

/// Whether a check is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Waiting for the next interval
    Idle,
    /// Ping in flight
    Checking,
}

/// Liveness checker for one connection.
pub struct HealthMonitor<C: Connection> {
    connection: Arc<C>,
    logger: Option<Arc<dyn LogSink>>,
    alert: Option<Arc<dyn AlertSink>>,
    config: MonitorConfig,
    checking: Arc<AtomicBool>,
}

impl<C: Connection> HealthMonitor<C> {
    /// Create a monitor with no sinks attached.
    pub fn new(connection: Arc<C>, config: MonitorConfig) -> Self {
        Self {
            connection,
            logger: None,
            alert: None,
            config,
            checking: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Report failures through `logger`.
    pub fn with_logger(mut self, logger: Option<Arc<dyn LogSink>>) -> Self {
        self.logger = logger;
        self
    }

    /// Send failure alerts through `alert`.
    pub fn with_alert(mut self, alert: Option<Arc<dyn AlertSink>>) -> Self {
        self.alert = alert;
        self
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        state_of(&self.checking)
    }

    /// Run one liveness check, reporting a failure before returning it.
    pub async fn check(&self) -> Result<(), DbError> {
        self.checking.store(true, Ordering::SeqCst);
        let result = self.connection.ping().await;
        self.checking.store(false, Ordering::SeqCst);

        match result {
            Ok(()) => {
                tracing::debug!("Database ping ok");
                Ok(())
            }
            Err(err) => {
                self.report(&err).await;
                Err(err)
            }
        }
    }

    /// Route a ping failure to the log sink and the alert sink.
    ///
    /// Alert delivery is attempted once; its failure is logged, not retried.
    pub async fn report(&self, err: &DbError) {
        tracing::warn!(error = %err, "Database ping failed");

        if let Some(logger) = &self.logger {
            logger.error(&format!("database ping failed: {err}"));
        }

        if let Some(alert) = &self.alert {
            if let Err(alert_err) = alert.send(&format!("Database ping error: {err}")).await {
                tracing::warn!(error = %alert_err, "Alert delivery failed");
                if let Some(logger) = &self.logger {
                    logger.error(&format!("alert delivery failed: {alert_err}"));
                }
            }
        }
    }

    /// Start checking on a background task.
    pub fn spawn(self) -> MonitorHandle {
        let token = CancellationToken::new();
        let checking = self.checking.clone();
        let task = tokio::spawn(self.run(token.clone()));
        MonitorHandle { token, checking, task }
    }

    async fn run(self, token: CancellationToken) {
        tracing::debug!(interval_secs = self.config.interval.as_secs(), "Health monitor started");

        loop {
            select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
            // Failures are already reported inside check().
            let _ = self.check().await;
        }

        tracing::debug!("Health monitor stopped");
    }
}

fn state_of(checking: &AtomicBool) -> MonitorState {
    if checking.load(Ordering::SeqCst) {
        MonitorState::Checking
    } else {
        MonitorState::Idle
    }
}

/// Control handle for a running monitor.
///
/// Dropping the handle leaves the monitor running.
pub struct MonitorHandle {
    token: CancellationToken,
    checking: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask the monitor to stop. A check already in flight completes first.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Check if stop has been requested.
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Current state of the monitor.
    pub fn state(&self) -> MonitorState {
        state_of(&self.checking)
    }

    /// Get a clone of the cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the monitor task to finish. Only returns after [`stop`](Self::stop).
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Health monitor task ended abnormally");
        }
    }

    /// Stop the monitor and wait for its task to finish.
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("is_stopped", &self.is_stopped())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MemoryConnection;
    use crate::logging::RecordingSink;
    use crate::services::alert::RecordingAlert;

    fn monitor(
        conn: &MemoryConnection,
        logger: &Arc<RecordingSink>,
        alert: &Arc<RecordingAlert>,
    ) -> HealthMonitor<MemoryConnection> {
        HealthMonitor::new(Arc::new(conn.clone()), MonitorConfig::default())
            .with_logger(Some(logger.clone() as Arc<dyn LogSink>))
            .with_alert(Some(alert.clone() as Arc<dyn AlertSink>))
    }

    #[test]
    fn test_default_interval_is_one_minute() {
        assert_eq!(MonitorConfig::default().interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_healthy_check_reports_nothing() {
        let conn = MemoryConnection::default();
        let logger = Arc::new(RecordingSink::new());
        let alert = Arc::new(RecordingAlert::new());

        let m = monitor(&conn, &logger, &alert);
        assert!(m.check().await.is_ok());
        assert_eq!(m.state(), MonitorState::Idle);
        assert!(logger.entries().is_empty());
        assert!(alert.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_check_logs_and_alerts() {
        let conn = MemoryConnection::default();
        conn.set_ping_failure(Some("server gone"));
        let logger = Arc::new(RecordingSink::new());
        let alert = Arc::new(RecordingAlert::new());

        let err = monitor(&conn, &logger, &alert).check().await.unwrap_err();
        assert!(err.is_connection_lost());
        assert_eq!(
            logger.error_messages(),
            vec!["database ping failed: Connection error: server gone"]
        );
        assert_eq!(alert.messages(), vec!["Database ping error: Connection error: server gone"]);
    }

    #[tokio::test]
    async fn test_alert_failure_is_logged() {
        let conn = MemoryConnection::default();
        conn.set_ping_failure(Some("timeout"));
        let logger = Arc::new(RecordingSink::new());
        let alert = Arc::new(RecordingAlert::failing("telegram unreachable"));

        let _ = monitor(&conn, &logger, &alert).check().await;
        let errors = logger.error_messages();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1], "alert delivery failed: alert transport error: telegram unreachable");
    }

    #[tokio::test]
    async fn test_failure_without_sinks_is_silent() {
        let conn = MemoryConnection::default();
        conn.set_ping_failure(Some("down"));
        let m = HealthMonitor::new(Arc::new(conn.clone()), MonitorConfig::default());
        assert!(m.check().await.is_err());
        assert_eq!(conn.pings(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_monitor_checks_every_interval() {
        let conn = MemoryConnection::default();
        conn.set_ping_failure(Some("down"));
        let logger = Arc::new(RecordingSink::new());
        let alert = Arc::new(RecordingAlert::new());

        let handle = monitor(&conn, &logger, &alert).spawn();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(conn.pings(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(conn.pings(), 1);
        assert_eq!(alert.messages().len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(conn.pings(), 2);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_no_longer_pings() {
        let conn = MemoryConnection::default();
        let handle = HealthMonitor::new(Arc::new(conn.clone()), MonitorConfig::default()).spawn();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(conn.pings(), 1);

        handle.stop();
        assert!(handle.is_stopped());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(conn.pings(), 1);

        handle.join().await;
    }
}
