//! Sample and log intake
//!
//! Glues the classifier to the deduplicator. Metric samples are classified
//! against their baseline; error log lines are always WARNING and skip
//! classification entirely.

use serde_json::{json, Map};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::baseline::BaselineTracker;
use crate::collector::{strip_port, ErrorLogRecord, Sample, UNKNOWN_NODE};
use crate::detection::{AnomalyClassifier, Severity};
use crate::notifications::{Notification, NotificationDeduplicator, NotificationSink, OfferOutcome};
use crate::utils::truncate_chars;

/// Item name used for every error log notification
pub const ERROR_LOG_ITEM: &str = "error_log";

/// Longest log message forwarded, in characters
pub const MAX_LOG_MESSAGE_CHARS: usize = 500;

/// Labels consulted, in order, to attribute a log stream to a node
const NODE_LABELS: &[&str] = &["node", "instance", "host", "pod"];

/// Classifier plus deduplicator
#[derive(Debug)]
pub struct AnomalyPipeline {
    classifier: AnomalyClassifier,
    dedup: Arc<NotificationDeduplicator>,
}

impl AnomalyPipeline {
    pub fn new(classifier: AnomalyClassifier, dedup: Arc<NotificationDeduplicator>) -> Self {
        Self { classifier, dedup }
    }

    /// Pipeline with a fresh baseline store and default cooldown
    pub fn with_sink(sink: Arc<dyn NotificationSink>) -> Self {
        Self::new(
            AnomalyClassifier::new(Arc::new(BaselineTracker::new())),
            Arc::new(NotificationDeduplicator::new(sink)),
        )
    }

    pub fn classifier(&self) -> &AnomalyClassifier {
        &self.classifier
    }

    pub fn dedup(&self) -> &Arc<NotificationDeduplicator> {
        &self.dedup
    }

    /// Classify one sample and offer any anomaly
    pub fn feed_metric(&self, sample: Sample) -> OfferOutcome {
        let verdict = self
            .classifier
            .classify(&sample.node, &sample.metric_name, sample.value);

        if !verdict.is_anomaly() {
            return OfferOutcome::Normal;
        }

        let message = verdict.message_text().to_string();
        self.dedup.offer(Notification::metric(
            sample.node,
            sample.metric_name,
            verdict.severity,
            message,
            sample.raw_payload,
        ))
    }

    /// Offer one error log line
    pub fn feed_error_log(
        &self,
        stream_labels: &BTreeMap<String, String>,
        line: &str,
        timestamp_nanos: &str,
    ) -> OfferOutcome {
        let node = log_node(stream_labels);
        let message = truncate_chars(line, MAX_LOG_MESSAGE_CHARS);

        let mut raw_payload = Map::new();
        raw_payload.insert("stream".to_string(), json!(stream_labels));
        raw_payload.insert("values".to_string(), json!([[timestamp_nanos, line]]));

        tracing::debug!(node = %node, "Error log line received");

        self.dedup.offer(
            Notification::log(node, ERROR_LOG_ITEM, Severity::Warning, message, raw_payload)
                .with_fingerprint_of(line),
        )
    }

    /// Convenience wrapper for collector records
    pub fn feed_error_record(&self, record: &ErrorLogRecord) -> OfferOutcome {
        self.feed_error_log(&record.stream_labels, &record.line, &record.timestamp_nanos)
    }

    /// Stop forwarding new notifications
    pub fn shutdown(&self) {
        self.dedup.shutdown();
    }
}

fn log_node(labels: &BTreeMap<String, String>) -> String {
    NODE_LABELS
        .iter()
        .find_map(|&label| {
            labels
                .get(label)
                .filter(|v| !v.is_empty())
                .map(|v| match label {
                    "instance" => strip_port(v).to_string(),
                    _ => v.clone(),
                })
        })
        .unwrap_or_else(|| UNKNOWN_NODE.to_string())
}
