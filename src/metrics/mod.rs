//! Prometheus metrics for the detection pipeline
//!
//! This module provides metrics tracking for:
//! - Classification: verdicts per metric and severity
//! - Notifications: dispatched, suppressed and shutdown-dropped offers
//! - Delivery: sink failures by reason, delivery latency
//! - Collection: upstream query failures by source and error category
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};
use std::sync::{Mutex, OnceLock};

// ============================================================================
// Metrics Storage
// ============================================================================

/// Container for all detection metrics
struct DetectionMetrics {
    classifications: CounterVec,
    notifications: CounterVec,
    sink_failures: CounterVec,
    delivery_duration: HistogramVec,
    collector_errors: CounterVec,
    tracked_keys: Gauge,
}

/// Global storage for detection metrics
static DETECTION_METRICS: OnceLock<DetectionMetrics> = OnceLock::new();

/// Whether initialization was attempted; held for the whole registration
static METRICS_INIT_ATTEMPTED: Mutex<bool> = Mutex::new(false);

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// This function should be called once at application startup.
/// If metric registration fails, the error is returned and subsequent
/// metric operations become no-ops.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = nodewatch::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    let mut attempted = METRICS_INIT_ATTEMPTED
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if *attempted {
        return Ok(());
    }
    *attempted = true;

    let detection = DetectionMetrics {
        classifications: register_counter_vec!(
            "nodewatch_classifications_total",
            "Total samples classified by metric and severity",
            &["metric", "severity"]
        )?,
        notifications: register_counter_vec!(
            "nodewatch_notifications_total",
            "Total notification offers by data type and outcome",
            &["data_type", "outcome"]
        )?,
        sink_failures: register_counter_vec!(
            "nodewatch_sink_failures_total",
            "Total failed deliveries to the analysis sink by reason",
            &["reason"]
        )?,
        delivery_duration: register_histogram_vec!(
            "nodewatch_delivery_duration_seconds",
            "Time spent delivering one payload including retries",
            &["sink"],
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        )?,
        collector_errors: register_counter_vec!(
            "nodewatch_collector_errors_total",
            "Total failed upstream queries by source and error category",
            &["source", "category"]
        )?,
        tracked_keys: register_gauge!(
            "nodewatch_dedup_tracked_keys",
            "Number of base keys held by the notification deduplicator"
        )?,
    };

    DETECTION_METRICS
        .set(detection)
        .map_err(|_| "Detection metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    DETECTION_METRICS.get().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn gather_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Current nodewatch series as one line, `name{labels} value` pairs
/// separated by `, `
///
/// Comments and series from other registrants are left out.
pub fn metrics_snapshot() -> Result<String, Box<dyn std::error::Error>> {
    let text = gather_metrics()?;
    let series: Vec<&str> = text
        .lines()
        .filter(|line| line.starts_with("nodewatch_"))
        .filter(|line| !line.contains("_bucket{"))
        .collect();
    Ok(series.join(", "))
}

/// Record one classification verdict
pub fn record_classification(metric: &str, severity: &str) {
    if let Some(m) = DETECTION_METRICS.get() {
        m.classifications
            .with_label_values(&[metric, severity])
            .inc();
    }
}

/// Record the outcome of one notification offer
pub fn record_notification(data_type: &str, outcome: &str) {
    if let Some(m) = DETECTION_METRICS.get() {
        m.notifications
            .with_label_values(&[data_type, outcome])
            .inc();
    }
}

/// Record a delivery that failed after retries
pub fn record_sink_failure(reason: &str) {
    if let Some(m) = DETECTION_METRICS.get() {
        m.sink_failures.with_label_values(&[reason]).inc();
    }
}

/// Record a failed upstream query
pub fn record_collector_error(source: &str, category: &str) {
    if let Some(m) = DETECTION_METRICS.get() {
        m.collector_errors
            .with_label_values(&[source, category])
            .inc();
    }
}

/// Update the number of tracked deduplication keys
pub fn update_tracked_keys(count: usize) {
    if let Some(m) = DETECTION_METRICS.get() {
        m.tracked_keys.set(count as f64);
    }
}

/// Histogram timer guard that records duration on drop
pub struct MetricsTimer {
    timer: Option<prometheus::HistogramTimer>,
}

impl MetricsTimer {
    fn new(timer: prometheus::HistogramTimer) -> Self {
        Self { timer: Some(timer) }
    }

    /// Create a no-op timer when metrics are not initialized
    fn noop() -> Self {
        Self { timer: None }
    }
}

impl Drop for MetricsTimer {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.stop_and_record();
        }
    }
}

/// Start a delivery timer for the given sink
pub fn start_delivery_timer(sink: &str) -> MetricsTimer {
    match DETECTION_METRICS.get() {
        Some(m) => MetricsTimer::new(
            m.delivery_duration
                .with_label_values(&[sink])
                .start_timer(),
        ),
        None => MetricsTimer::noop(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ensure_metrics_initialized() {
        let _ = init_metrics();
    }

    #[test]
    fn test_init_metrics() {
        assert!(init_metrics().is_ok());

        // Second call is a no-op
        assert!(init_metrics().is_ok());
    }

    #[test]
    fn test_metrics_initialized() {
        ensure_metrics_initialized();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_gather_metrics_contains_recorded_series() {
        ensure_metrics_initialized();
        record_classification("cpu_usage_percent", "CRITICAL");
        record_notification("metric", "dispatched");

        let text = gather_metrics().unwrap();
        assert!(text.contains("nodewatch_classifications_total"));
        assert!(text.contains("nodewatch_notifications_total"));
    }

    #[test]
    fn test_failure_counters() {
        ensure_metrics_initialized();
        record_sink_failure("timeout");
        record_collector_error("prometheus", "network");
        update_tracked_keys(3);

        let text = gather_metrics().unwrap();
        assert!(text.contains("nodewatch_sink_failures_total"));
        assert!(text.contains(r#"category="network""#));
    }

    #[test]
    fn test_metrics_snapshot_lists_series_only() {
        ensure_metrics_initialized();
        record_notification("log", "suppressed");
        let _timer = start_delivery_timer("snapshot");
        drop(_timer);

        let snapshot = metrics_snapshot().unwrap();
        assert!(snapshot.contains(r#"nodewatch_notifications_total{data_type="log",outcome="suppressed"}"#));
        assert!(snapshot.contains("nodewatch_delivery_duration_seconds_count"));
        assert!(!snapshot.contains("# HELP"));
        assert!(!snapshot.contains("_bucket{"));
        assert!(!snapshot.contains('\n'));
    }

    #[test]
    fn test_delivery_timer() {
        ensure_metrics_initialized();
        let _timer = start_delivery_timer("analysis");
    }
}
