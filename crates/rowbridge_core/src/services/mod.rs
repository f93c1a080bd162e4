//! Services behind the database handle.
//!
//! - `normalize` - maps raw driver cells onto canonical values
//! - `decode` - drives a cursor into ordered rows
//! - `query_log` - call-site query logging with one-shot suppression
//! - `health` - periodic liveness checks
//! - `alert` - outbound alert sinks (Telegram)

pub mod alert;
pub mod decode;
pub mod health;
pub mod normalize;
pub mod query_log;

pub use alert::{AlertError, AlertSink, TelegramAlert};
pub use decode::decode_rows;
pub use health::{HealthMonitor, MonitorConfig, MonitorHandle, MonitorState};
pub use normalize::{normalize, ScanFamily};
pub use query_log::{render_query, QueryLog};

#[cfg(any(test, feature = "testing"))]
pub use alert::RecordingAlert;
