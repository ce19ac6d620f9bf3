//! Sample classification against the rolling baseline

use std::sync::Arc;

use super::{MetricKind, Verdict};
use crate::baseline::BaselineTracker;
use crate::metrics;

/// Classifies samples using the shared [`BaselineTracker`]
///
/// The classifier holds no state of its own: each call advances the
/// baseline for the sample's key and then applies the rule for the metric
/// kind to the value and the *updated* baseline.
#[derive(Debug, Clone)]
pub struct AnomalyClassifier {
    tracker: Arc<BaselineTracker>,
}

impl AnomalyClassifier {
    pub fn new(tracker: Arc<BaselineTracker>) -> Self {
        Self { tracker }
    }

    /// Shared baseline store
    pub fn tracker(&self) -> &Arc<BaselineTracker> {
        &self.tracker
    }

    /// Record the sample and decide its severity
    ///
    /// Unknown metric names still advance the baseline but always yield
    /// NORMAL; the mismatch is only logged. Non-finite values are dropped
    /// before they reach the baseline.
    pub fn classify(&self, node: &str, metric_name: &str, value: f64) -> Verdict {
        if !value.is_finite() {
            tracing::warn!(node = %node, metric = %metric_name, value, "Non-finite sample, skipping detection");
            return Verdict::normal();
        }

        let reading = self.tracker.update(node, metric_name, value);

        let Some(kind) = MetricKind::from_metric_name(metric_name) else {
            tracing::warn!(node = %node, metric = %metric_name, "Unknown metric, skipping detection");
            return Verdict::normal();
        };

        let verdict = kind.evaluate(metric_name, value, reading.available());

        tracing::trace!(
            node = %node,
            metric = %metric_name,
            value,
            baseline = ?reading.available(),
            samples = reading.samples,
            severity = %verdict.severity,
            "Sample classified"
        );
        metrics::record_classification(metric_name, verdict.severity.as_str());

        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Severity;

    const MIB: f64 = 1024.0 * 1024.0;

    fn classifier() -> AnomalyClassifier {
        AnomalyClassifier::new(Arc::new(BaselineTracker::new()))
    }

    #[test]
    fn test_cpu_zero_is_critical_without_history() {
        let c = classifier();
        assert_eq!(
            c.classify("node-a", "cpu_usage_percent", 0.0).severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_cpu_high_is_critical_without_history() {
        let c = classifier();
        let verdict = c.classify("node-a", "cpu_usage_percent", 95.0);
        assert_eq!(verdict.severity, Severity::Critical);
        assert!(verdict.message_text().contains("95.00"));
    }

    #[test]
    fn test_cpu_zero_is_critical_with_ready_baseline() {
        let c = classifier();
        for _ in 0..15 {
            c.classify("node-a", "cpu_usage_percent", 30.0);
        }
        assert_eq!(
            c.classify("node-a", "cpu_usage_percent", 0.0).severity,
            Severity::Critical
        );
    }

    #[test]
    fn test_disk_iops_examples() {
        let c = classifier();
        assert_eq!(c.classify("n", "disk_read_iops", 0.0).severity, Severity::Normal);
        assert_eq!(c.classify("n", "disk_read_iops", 600.0).severity, Severity::Critical);
        assert_eq!(c.classify("n", "disk_read_iops", 150.0).severity, Severity::Warning);
    }

    #[test]
    fn test_unknown_metric_is_normal_but_tracked() {
        let c = classifier();
        let verdict = c.classify("node-a", "gpu_temperature", 1000.0);

        assert_eq!(verdict, Verdict::normal());
        assert_eq!(c.tracker().get("node-a", "gpu_temperature").samples, 1);
    }

    #[test]
    fn test_amplification_uses_updated_baseline() {
        let c = classifier();
        for _ in 0..9 {
            assert_eq!(
                c.classify("node-a", "net_rx_bytes", 2.0 * MIB).severity,
                Severity::Normal
            );
        }

        // 10th sample makes the baseline ready: 0.3 * 20 + 0.7 * 2 = 7.4 MiB,
        // ratio 2.7x and above 5 MiB/s -> WARNING
        let verdict = c.classify("node-a", "net_rx_bytes", 20.0 * MIB);
        assert_eq!(verdict.severity, Severity::Warning);
    }

    #[test]
    fn test_blackout_detected_after_baseline_ready() {
        let c = classifier();
        for _ in 0..10 {
            c.classify("node-a", "tcp_retransmits", 4.0);
        }
        let verdict = c.classify("node-a", "tcp_retransmits", 0.0);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn test_keys_are_independent_per_node() {
        let c = classifier();
        for _ in 0..10 {
            c.classify("node-a", "packet_drops", 1.0);
        }
        // node-b has no baseline and falls back to absolute mode
        assert_eq!(
            c.classify("node-b", "packet_drops", 0.0).severity,
            Severity::Normal
        );
    }

    #[test]
    fn test_infinite_sample_does_not_mask_later_spike() {
        let c = classifier();
        for _ in 0..10 {
            c.classify("node-a", "net_rx_bytes", MIB);
        }

        assert_eq!(
            c.classify("node-a", "net_rx_bytes", f64::INFINITY),
            Verdict::normal()
        );

        for _ in 0..30 {
            c.classify("node-a", "net_rx_bytes", MIB);
        }
        let reading = c.tracker().get("node-a", "net_rx_bytes");
        assert!(reading.value.is_finite());
        assert!((reading.value - MIB).abs() < 1.0);

        // 40 MiB/s is below the absolute limit; caught by ratio only
        let verdict = c.classify("node-a", "net_rx_bytes", 40.0 * MIB);
        assert_eq!(verdict.severity, Severity::Critical);
    }

    #[test]
    fn test_infinite_sample_does_not_fake_blackout() {
        let c = classifier();
        for _ in 0..10 {
            c.classify("node-a", "tcp_retransmits", 0.0);
        }
        c.classify("node-a", "tcp_retransmits", f64::INFINITY);
        c.classify("node-a", "tcp_retransmits", f64::NEG_INFINITY);

        for _ in 0..5 {
            assert_eq!(
                c.classify("node-a", "tcp_retransmits", 0.0).severity,
                Severity::Normal
            );
        }
        assert_eq!(c.tracker().get("node-a", "tcp_retransmits").value, 0.0);
    }

    #[test]
    fn test_nan_sample_is_not_recorded() {
        let c = classifier();
        assert_eq!(c.classify("node-a", "cpu_usage_percent", f64::NAN), Verdict::normal());
        assert!(c.tracker().is_empty());
    }
}
