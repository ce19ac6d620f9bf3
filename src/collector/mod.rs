//! Upstream collection from Prometheus and Loki
//!
//! The collector side pulls metric samples and error log lines on fixed
//! schedules and feeds them to the [`AnomalyPipeline`](crate::pipeline::AnomalyPipeline).
//!
//! - [`prometheus`] - instant vector queries, one per catalogued metric
//! - [`loki`] - range queries for error log lines
//! - [`cursor`] - skips log lines already processed in an earlier window
//! - [`queries`] - the PromQL catalog
//! - [`driver`] - the periodic scan loops

pub mod cursor;
pub mod driver;
pub mod loki;
pub mod prometheus;
pub mod queries;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use cursor::LogCursor;
pub use driver::{Driver, DriverHandle, ScheduleConfig};
pub use loki::{LokiClient, LokiConfig};
pub use prometheus::{PrometheusClient, PrometheusConfig};
pub use queries::{MetricQuery, METRIC_QUERIES};

/// Node name used when no identifying label is present
pub const UNKNOWN_NODE: &str = "unknown";

/// Result type for collector operations
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Errors raised while querying upstream sources
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Source answered but reported a failed query
    #[error("query failed ({status}): {message}")]
    QueryFailed { status: String, message: String },

    /// Response body did not match the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CollectorError {
    /// Transient failures that a later scan may not hit again
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::QueryFailed { .. } | Self::Decode(_) | Self::InvalidConfig(_) => false,
        }
    }

    /// True when the source could not be reached at all
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Http(e) if e.is_connect())
    }
}

/// One metric observation for one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub node: String,
    pub metric_name: String,
    pub value: f64,
    /// Unix seconds reported by the source
    pub timestamp: i64,
    /// Original upstream record, forwarded downstream unmodified
    pub raw_payload: Map<String, Value>,
}

/// One error log line with the labels of its stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLogRecord {
    pub stream_labels: BTreeMap<String, String>,
    pub line: String,
    /// Nanosecond timestamp exactly as Loki reported it
    pub timestamp_nanos: String,
}

/// `10.0.2.131:9100` -> `10.0.2.131`
pub fn strip_port(instance: &str) -> &str {
    instance.split(':').next().unwrap_or(instance)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_port() {
        assert_eq!(strip_port("10.0.2.131:9100"), "10.0.2.131");
        assert_eq!(strip_port("node-a"), "node-a");
        assert_eq!(strip_port(""), "");
    }

    #[test]
    fn test_status_recoverability() {
        assert!(CollectorError::Status {
            status: 503,
            body: String::new()
        }
        .is_recoverable());
        assert!(!CollectorError::Status {
            status: 400,
            body: String::new()
        }
        .is_recoverable());
        assert!(!CollectorError::Decode("bad".into()).is_recoverable());
    }
}
