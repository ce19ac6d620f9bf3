//! Deduplicated anomaly notifications
//!
//! Verdicts that survive classification are offered to the
//! [`NotificationDeduplicator`], which decides whether the anomaly is new
//! enough to forward and then hands the annotated payload to a
//! [`NotificationSink`] on a background task.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────┐
//! │      NotificationDeduplicator              │
//! │  - Shutdown gate                           │
//! │  - Per-key cooldown (600s)                 │
//! │  - Severity-change bypass                  │
//! │  - Optimistic commit before send           │
//! └────────────────────────────────────────────┘
//!                     │ tokio::spawn
//!                     ▼
//!             ┌───────────────┐
//!             │ AnalysisSink  │  POST {base}/analyze
//!             │ timeout+retry │
//!             └───────────────┘
//! ```
//!
//! # Keys
//!
//! - **base key** `node:item` tracks the last severity sent.
//! - **notification key** `node:item:SEVERITY` tracks the cooldown. Log
//!   notifications append a digest of the log line so distinct lines are
//!   never coalesced.

pub mod channels;
mod dedup;
pub mod payload;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::detection::Severity;

pub use channels::analysis::{AnalysisConfig, AnalysisSink};
pub use channels::{DeliveryStatus, NotificationSink, SinkError, SinkResult};
pub use dedup::{NotificationDeduplicator, DEFAULT_COOLDOWN_SECS};

/// Origin of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Derived from a classified metric sample
    Metric,
    /// Derived from an error log line
    Log,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metric => "metric",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A candidate notification handed to the deduplicator
#[derive(Debug, Clone)]
pub struct Notification {
    pub node: String,
    /// Metric name, or the log item name for log notifications
    pub item_name: String,
    pub severity: Severity,
    pub message: String,
    /// Original upstream record, forwarded unmodified apart from annotations
    pub payload: serde_json::Map<String, serde_json::Value>,
    pub data_type: DataType,
    /// Content digest appended to log notification keys
    pub fingerprint: Option<String>,
}

impl Notification {
    /// Notification for a classified metric sample
    pub fn metric(
        node: impl Into<String>,
        metric_name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            node: node.into(),
            item_name: metric_name.into(),
            severity,
            message: message.into(),
            payload,
            data_type: DataType::Metric,
            fingerprint: None,
        }
    }

    /// Notification for an error log line
    pub fn log(
        node: impl Into<String>,
        item_name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let message = message.into();
        Self {
            node: node.into(),
            item_name: item_name.into(),
            severity,
            fingerprint: Some(message_digest(&message)),
            message,
            payload,
            data_type: DataType::Log,
        }
    }

    /// Key the cooldown on a digest of `content` instead of the message
    pub fn with_fingerprint_of(mut self, content: &str) -> Self {
        self.fingerprint = Some(message_digest(content));
        self
    }

    /// `node:item`, used for severity-change tracking
    pub fn base_key(&self) -> String {
        format!("{}:{}", self.node, self.item_name)
    }

    /// `node:item:SEVERITY[:digest]`, used for cooldown tracking
    pub fn notification_key(&self) -> String {
        let key = format!("{}:{}", self.base_key(), self.severity.as_str());
        match (self.data_type, &self.fingerprint) {
            (DataType::Log, Some(fingerprint)) => format!("{key}:{fingerprint}"),
            _ => key,
        }
    }
}

/// Short stable digest of a message body (first 16 hex chars of SHA-256)
pub fn message_digest(message: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(message.as_bytes()));
    digest[..16].to_string()
}

/// What happened to an offered notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    /// State committed and the send was handed to a background task
    Dispatched,
    /// Same notification key was sent within the cooldown
    Suppressed { remaining_secs: i64 },
    /// Shutdown has begun; nothing was recorded or sent
    ShuttingDown,
    /// NORMAL verdicts are never forwarded
    Normal,
}

impl OfferOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched)
    }

    /// Label used for the notifications counter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Suppressed { .. } => "suppressed",
            Self::ShuttingDown => "shutdown",
            Self::Normal => "normal",
        }
    }
}
