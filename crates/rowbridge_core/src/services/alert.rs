//! Outbound alert delivery.
//!
//! The health monitor hands every connectivity failure to an [`AlertSink`].
//! [`TelegramAlert`] posts to a Telegram chat through the Bot API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Alert delivery failures.
#[derive(Debug, Error)]
pub enum AlertError {
    /// The request never got a response.
    #[error("alert transport error: {0}")]
    Transport(String),
    /// The remote end answered with a non-success status.
    #[error("alert rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
}

/// Destination for a single textual alert.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Deliver one message.
    async fn send(&self, message: &str) -> Result<(), AlertError>;
}

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends alerts to a Telegram chat via `sendMessage`.
#[derive(Debug, Clone)]
pub struct TelegramAlert {
    base_url: String,
    bot_token: String,
    chat_id: i64,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

impl TelegramAlert {
    /// Create a sink for `chat_id` using `bot_token`.
    pub fn new(bot_token: impl Into<String>, chat_id: i64) -> Result<Self, AlertError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|err| AlertError::Transport(err.to_string()))?;
        Ok(Self { base_url: TELEGRAM_API.to_string(), bot_token: bot_token.into(), chat_id, client })
    }

    /// Point the sink at a different API host.
    pub fn with_base_url(mut self, mut base_url: String) -> Self {
        let trimmed_len = base_url.trim_end_matches('/').len();
        base_url.truncate(trimmed_len);
        self.base_url = base_url;
        self
    }

    /// Chat receiving the alerts.
    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token)
    }
}

#[async_trait]
impl AlertSink for TelegramAlert {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&SendMessage { chat_id: self.chat_id, text: message })
            .send()
            .await
            .map_err(|err| AlertError::Transport(err.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(AlertError::Rejected { status: status.as_u16(), body })
    }
}

/// Alert sink that records messages and can be told to fail, for tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct RecordingAlert {
    messages: parking_lot::Mutex<Vec<String>>,
    failure: parking_lot::Mutex<Option<String>>,
}

#[cfg(any(test, feature = "testing"))]
impl RecordingAlert {
    /// Create a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sink that records, then rejects, every message.
    pub fn failing(message: impl Into<String>) -> Self {
        let sink = Self::default();
        *sink.failure.lock() = Some(message.into());
        sink
    }

    /// Messages received so far.
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl AlertSink for RecordingAlert {
    async fn send(&self, message: &str) -> Result<(), AlertError> {
        self.messages.lock().push(message.to_string());
        match self.failure.lock().clone() {
            Some(reason) => Err(AlertError::Transport(reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_endpoint() {
        let sink = TelegramAlert::new("123:abc", -100).unwrap();
        assert_eq!(sink.endpoint(), "https://api.telegram.org/bot123:abc/sendMessage");
        assert_eq!(sink.chat_id(), -100);

        let sink = sink.with_base_url("http://127.0.0.1:9000//".to_string());
        assert_eq!(sink.endpoint(), "http://127.0.0.1:9000/bot123:abc/sendMessage");
    }

    #[test]
    fn test_payload_shape() {
        let json = serde_json::to_string(&SendMessage { chat_id: 42, text: "db down" }).unwrap();
        assert_eq!(json, r#"{"chat_id":42,"text":"db down"}"#);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        // Port 9 (discard) on localhost is almost never listening.
        let sink = TelegramAlert::new("t", 1).unwrap().with_base_url("http://127.0.0.1:9".to_string());
        let err = sink.send("hello").await.unwrap_err();
        assert!(matches!(err, AlertError::Transport(_)));
    }

    #[tokio::test]
    async fn test_recording_alert() {
        let ok = RecordingAlert::new();
        ok.send("a").await.unwrap();
        assert_eq!(ok.messages(), vec!["a"]);

        let failing = RecordingAlert::failing("offline");
        assert!(failing.send("b").await.is_err());
        assert_eq!(failing.messages(), vec!["b"]);
    }
}
