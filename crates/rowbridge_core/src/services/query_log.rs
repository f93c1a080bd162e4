//! Call-site query logging with one-shot suppression.
//!
//! Every query and statement is logged as two debug entries: where it was
//! issued from, then the SQL with parameters substituted in.
//!
//! The suppression flag is a plain atomic with no lock around the
//! suppress-then-query sequence. Two tasks racing on the same handle can see a
//! stale or lost suppression; treat a handle with logging enabled as
//! single-writer if suppression must be deterministic.

use crate::logging::LogSink;
use crate::models::{CallSite, Param};

use std::sync::atomic::{AtomicBool, Ordering};

/// Suppression state plus the logging step run before each query.
#[derive(Debug, Default)]
pub struct QueryLog {
    skip_next: AtomicBool,
}

impl QueryLog {
    /// Create a logger with suppression off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress the log entries of the next recorded call only.
    pub fn skip_next(&self) {
        self.skip_next.store(true, Ordering::Relaxed);
    }

    /// Whether the next recorded call will be suppressed.
    pub fn is_skipping(&self) -> bool {
        self.skip_next.load(Ordering::Relaxed)
    }

    /// Log one call. Returns whether anything was emitted.
    ///
    /// The suppression flag is consumed here whether or not a sink is
    /// attached.
    pub fn record(
        &self,
        sink: Option<&dyn LogSink>,
        site: &CallSite,
        sql: &str,
        params: &[Param],
    ) -> bool {
        if self.skip_next.swap(false, Ordering::Relaxed) {
            return false;
        }
        let Some(sink) = sink else {
            return false;
        };

        sink.debug(&site.to_string());
        sink.debug(&render_query(sql, params));
        true
    }
}

/// Substitute parameters into `?` placeholders, left to right, for display.
///
/// Each parameter replaces the first `?` still present in the text, including
/// any introduced by an earlier parameter. Nothing is escaped; the result is
/// not executable SQL.
pub fn render_query(sql: &str, params: &[Param]) -> String {
    params
        .iter()
        .fold(sql.to_string(), |rendered, param| rendered.replacen('?', &param.to_string(), 1))
}
