//! Delivery channels for annotated anomaly payloads
//!
//! The deduplicator only knows the [`NotificationSink`] trait; the
//! production implementation is the HTTP [`analysis::AnalysisSink`].

pub mod analysis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while delivering a payload
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Request did not complete within the timeout (retryable)
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Remote endpoint refused or dropped the connection
    #[error("connection failed: {0}")]
    Connect(String),

    /// Remote endpoint answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Any other transport-level failure
    #[error("request failed: {0}")]
    Request(reqwest::Error),

    /// Invalid sink configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Payload could not be serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SinkError {
    /// Only timeout-class failures are worth retrying
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Stable label for logs and counters
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connect",
            Self::Status { .. } => "status",
            Self::Request(_) => "request",
            Self::InvalidConfig(_) => "config",
            Self::Serialization(_) => "serialization",
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Request(err)
        }
    }
}

/// Outcome of a successful delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatus {
    /// Sink that delivered the payload
    pub channel: String,
    /// Number of attempts it took
    pub attempts: u32,
    /// Optional message about the delivery
    pub message: Option<String>,
    /// Timestamp of the successful attempt
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl DeliveryStatus {
    /// Create a delivery status
    pub fn delivered(channel: impl Into<String>, attempts: u32) -> Self {
        Self {
            channel: channel.into(),
            attempts,
            message: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Attach a message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[DELIVERED] {} after {} attempt(s)", self.channel, self.attempts)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

/// Destination for annotated anomaly payloads
///
/// Implementations own their timeout and retry policy; a returned error is
/// final for that payload.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sink name used in logs
    fn name(&self) -> &str;

    /// Deliver one payload
    async fn deliver(&self, payload: &serde_json::Value) -> SinkResult<DeliveryStatus>;
}
