//! nodewatch - baseline-driven anomaly detection for node metrics and error logs
//!
//! Samples pulled from Prometheus and error lines pulled from Loki are
//! classified against a per-(node, metric) rolling baseline. Anomalies pass
//! through a cooldown/severity-change gate before being forwarded to an
//! external analysis service.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`baseline`] - Rolling history and EMA baseline per (node, metric)
//! - [`detection`] - Metric kinds, threshold policies and the classifier
//! - [`notifications`] - Deduplication, payload annotation and delivery sinks
//! - [`pipeline`] - Sample and log intake wiring classifier to deduplicator
//! - [`collector`] - Prometheus/Loki clients and the periodic scan loops
//! - [`config`] - Configuration management and settings
//! - [`error`] - Unified error type
//! - [`metrics`] - Process-level Prometheus counters
//! - [`utils`] - Common utilities and helpers
//!
//! # Example
//!
//! ```no_run
//! use nodewatch::collector::Driver;
//! use nodewatch::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let handle = Driver::from_config(&config)?.start();
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod baseline;
pub mod collector;
pub mod config;
pub mod detection;
pub mod error;
pub mod metrics;
pub mod notifications;
pub mod pipeline;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::baseline::{BaselineReading, BaselineTracker};
    pub use crate::collector::{Driver, DriverHandle, ErrorLogRecord, Sample};
    pub use crate::config::Config;
    pub use crate::detection::{AnomalyClassifier, MetricKind, Severity, Verdict};
    pub use crate::error::{Error, ErrorCategory, NodewatchError, Result};
    pub use crate::notifications::{
        AnalysisConfig, AnalysisSink, DataType, Notification, NotificationDeduplicator,
        NotificationSink, OfferOutcome,
    };
    pub use crate::pipeline::AnomalyPipeline;
}

// Direct re-exports for convenience
pub use detection::{Severity, Verdict};
pub use pipeline::AnomalyPipeline;
