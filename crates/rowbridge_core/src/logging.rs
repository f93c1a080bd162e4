//! Structured logging setup and the log sink used by query logging.
//!
//! Provides:
//! - Daily rotating log files with console output
//! - Console-only fallback when file logging fails
//! - Environment variable override via ROWBRIDGE_LOG or RUST_LOG
//! - The [`LogSink`] trait that a database handle writes query and health
//!   diagnostics to

use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Destination for leveled diagnostics emitted by a database handle.
///
/// A handle without a sink logs nothing; that is a supported configuration.
pub trait LogSink: Send + Sync {
    /// Record a debug-level message.
    fn debug(&self, message: &str);

    /// Record an error-level message.
    fn error(&self, message: &str);
}

/// Sink that forwards to the global `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "rowbridge", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "rowbridge", "{message}");
    }
}

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether running in a PTY (affects output formatting)
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber.
///
/// If file logging initialization fails, falls back to console-only.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    let env_filter = build_env_filter(filter);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender(&config.log_dir)?);

    // Console gets INFO and above; the file gets whatever the filter allows.
    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
    let combined = stdout.and(non_blocking);

    let env_filter = build_env_filter(config.log_filter.as_deref());

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    Ok(guard)
}

/// Daily-rotated `rowbridge.*.log` files under `log_dir`, created if missing.
fn file_appender(log_dir: &Path) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(log_dir)?;

    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rowbridge")
        .filename_suffix("log")
        .build(log_dir)?)
}

/// Priority: custom filter > ROWBRIDGE_LOG > RUST_LOG > default.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("ROWBRIDGE_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,rowbridge=debug,rowbridge_core=trace,tokio_postgres=warn,hyper=warn,reqwest=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,rowbridge=info,rowbridge_core=info,tokio_postgres=warn,hyper=warn,reqwest=warn"
    }
}

/// In-memory sink that records every message, for tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingSink {
    entries: parking_lot::Mutex<Vec<(tracing::Level, String)>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded entries, oldest first.
    pub fn entries(&self) -> Vec<(tracing::Level, String)> {
        self.entries.lock().clone()
    }

    /// Recorded debug messages.
    pub fn debug_messages(&self) -> Vec<String> {
        self.messages_at(tracing::Level::DEBUG)
    }

    /// Recorded error messages.
    pub fn error_messages(&self) -> Vec<String> {
        self.messages_at(tracing::Level::ERROR)
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    fn messages_at(&self, level: tracing::Level) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

#[cfg(any(test, feature = "testing"))]
impl LogSink for RecordingSink {
    fn debug(&self, message: &str) {
        self.entries.lock().push((tracing::Level::DEBUG, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.entries.lock().push((tracing::Level::ERROR, message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_driver_noise() {
        let filter = default_log_filter();
        assert!(filter.contains("tokio_postgres=warn"));
        assert!(filter.contains("rowbridge_core="));
    }

    #[test]
    fn test_invalid_custom_filter_falls_back() {
        // Must not panic on garbage input.
        let _ = build_env_filter(Some("=[not a filter"));
        let _ = build_env_filter(Some("rowbridge=trace"));
    }

    #[test]
    fn test_recording_sink_separates_levels() {
        let sink = RecordingSink::new();
        sink.debug("a");
        sink.error("b");
        sink.debug("c");
        assert_eq!(sink.debug_messages(), vec!["a", "c"]);
        assert_eq!(sink.error_messages(), vec!["b"]);
        assert_eq!(sink.entries().len(), 3);
        sink.clear();
        assert!(sink.entries().is_empty());
    }

    #[test]
    fn test_file_appender_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("nested").join("logs");

        assert!(file_appender(&log_dir).is_ok());
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_log_config_filter() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig::new(dir.path().to_path_buf()).with_filter("rowbridge=trace");
        assert_eq!(config.log_filter.as_deref(), Some("rowbridge=trace"));
        assert_eq!(config.log_dir, dir.path());
    }

    #[test]
    fn test_tracing_sink_without_subscriber_is_silent() {
        TracingSink.debug("nothing listens");
        TracingSink.error("still fine");
    }
}
