//! Common test utilities

use async_trait::async_trait;
use nodewatch::collector::Sample;
use nodewatch::notifications::{DeliveryStatus, NotificationSink, SinkResult};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

pub const MIB: f64 = 1024.0 * 1024.0;

/// Sink that hands every payload to a channel
pub struct RecordingSink {
    tx: mpsc::UnboundedSender<Value>,
}

impl RecordingSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, payload: &Value) -> SinkResult<DeliveryStatus> {
        let _ = self.tx.send(payload.clone());
        Ok(DeliveryStatus::delivered(self.name(), 1))
    }
}

/// Wait for the next delivered payload
pub async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a delivery")
        .expect("sink channel closed")
}

/// Assert nothing else gets delivered shortly
#[allow(dead_code)]
pub async fn assert_no_payload(rx: &mut mpsc::UnboundedReceiver<Value>) {
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "unexpected delivery: {extra:?}");
}

/// Create a sample with a minimal Prometheus-shaped raw payload
#[allow(dead_code)]
pub fn create_sample(node: &str, metric_name: &str, value: f64) -> Sample {
    let mut raw_payload = Map::new();
    raw_payload.insert(
        "metric".to_string(),
        json!({ "instance": format!("{node}:9100") }),
    );
    raw_payload.insert("value".to_string(), json!([1_700_000_000, value.to_string()]));
    raw_payload.insert("node".to_string(), json!(node));

    Sample {
        node: node.to_string(),
        metric_name: metric_name.to_string(),
        value,
        timestamp: 1_700_000_000,
        raw_payload,
    }
}

/// Stream labels as Loki reports them
#[allow(dead_code)]
pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Prometheus instant-vector body with one element per `(instance, value)`
#[allow(dead_code)]
pub fn prometheus_vector(points: &[(&str, &str)]) -> Value {
    let result: Vec<Value> = points
        .iter()
        .map(|(instance, value)| {
            json!({
                "metric": { "instance": instance, "job": "node-exporter" },
                "value": [1_700_000_000.5, value]
            })
        })
        .collect();

    json!({
        "status": "success",
        "data": { "resultType": "vector", "result": result }
    })
}

/// Loki range body with one stream
#[allow(dead_code)]
pub fn loki_streams(stream: Value, values: &[(&str, &str)]) -> Value {
    let values: Vec<Value> = values.iter().map(|(ts, line)| json!([ts, line])).collect();
    json!({
        "status": "success",
        "data": {
            "resultType": "streams",
            "result": [{ "stream": stream, "values": values }]
        }
    })
}
