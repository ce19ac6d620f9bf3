//! Prometheus instant-query client

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{strip_port, CollectorError, CollectorResult, Sample, UNKNOWN_NODE};

/// Prometheus connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:9090".to_string()
}

fn default_query_timeout() -> u64 {
    10
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            query_timeout_secs: default_query_timeout(),
        }
    }
}

impl PrometheusConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(default)]
    result: Vec<VectorResult>,
}

#[derive(Debug, Deserialize)]
struct VectorResult {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    /// `[unix_seconds, "value"]`
    #[serde(default)]
    value: Vec<Value>,
}

/// Client for the Prometheus HTTP API
pub struct PrometheusClient {
    endpoint: String,
    client: Client,
}

impl PrometheusClient {
    pub fn new(config: &PrometheusConfig) -> CollectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|e| CollectorError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        tracing::info!(base_url = %config.base_url, "Prometheus client initialized");

        Ok(Self {
            endpoint: format!("{}/api/v1/query", config.base_url.trim_end_matches('/')),
            client,
        })
    }

    /// Run an instant query and convert each vector element into a [`Sample`]
    pub async fn query(&self, metric_name: &str, promql: &str) -> CollectorResult<Vec<Sample>> {
        tracing::debug!(metric = %metric_name, "Prometheus instant query");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("query", promql)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: QueryResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::Decode(e.to_string()))?;

        samples_from_response(metric_name, body)
    }
}

fn samples_from_response(metric_name: &str, body: QueryResponse) -> CollectorResult<Vec<Sample>> {
    if body.status != "success" {
        return Err(CollectorError::QueryFailed {
            status: body.error_type.unwrap_or(body.status),
            message: body.error.unwrap_or_default(),
        });
    }

    let results = body.data.map(|d| d.result).unwrap_or_default();
    Ok(results
        .into_iter()
        .filter_map(|result| to_sample(metric_name, result))
        .collect())
}

fn to_sample(metric_name: &str, result: VectorResult) -> Option<Sample> {
    let instance = result
        .metric
        .get("instance")
        .cloned()
        .unwrap_or_else(|| UNKNOWN_NODE.to_string());
    let node = strip_port(&instance).to_string();

    let timestamp = result.value.first().and_then(Value::as_f64)? as i64;
    let raw_value = result.value.get(1)?;
    let value = match raw_value.as_str().map(str::parse::<f64>) {
        Some(Ok(v)) if v.is_finite() => v,
        _ => {
            tracing::debug!(node = %node, metric = %metric_name, value = %raw_value, "Skipping non-finite sample");
            return None;
        }
    };

    let mut raw_payload = Map::new();
    raw_payload.insert(
        "metric".to_string(),
        serde_json::to_value(&result.metric).unwrap_or(Value::Null),
    );
    raw_payload.insert("value".to_string(), Value::Array(result.value));
    raw_payload.insert("node".to_string(), Value::from(node.as_str()));
    raw_payload.insert("instance".to_string(), Value::from(instance));

    Some(Sample {
        node,
        metric_name: metric_name.to_string(),
        value,
        timestamp,
        raw_payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(body: Value) -> CollectorResult<Vec<Sample>> {
        samples_from_response("disk_write_bytes", serde_json::from_value(body).unwrap())
    }

    #[test]
    fn test_vector_result_becomes_samples() {
        let samples = parse(json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {"instance": "10.0.2.131:9100", "job": "node"},
                     "value": [1705747800.5, "26214400"]},
                    {"metric": {"job": "node"}, "value": [1705747800, "1.5"]}
                ]
            }
        }))
        .unwrap();

        assert_eq!(samples.len(), 2);
        let first = &samples[0];
        assert_eq!(first.node, "10.0.2.131");
        assert_eq!(first.metric_name, "disk_write_bytes");
        assert_eq!(first.value, 26_214_400.0);
        assert_eq!(first.timestamp, 1_705_747_800);
        assert_eq!(first.raw_payload["instance"], "10.0.2.131:9100");
        assert_eq!(first.raw_payload["node"], "10.0.2.131");
        assert_eq!(first.raw_payload["metric"]["job"], "node");
        assert_eq!(first.raw_payload["value"][1], "26214400");

        assert_eq!(samples[1].node, "unknown");
        assert_eq!(samples[1].raw_payload["instance"], "unknown");
    }

    #[test]
    fn test_non_finite_values_are_skipped() {
        let samples = parse(json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [
                {"metric": {"instance": "a:1"}, "value": [1, "NaN"]},
                {"metric": {"instance": "b:1"}, "value": [1, "garbage"]},
                {"metric": {"instance": "c:1"}, "value": [1]},
                {"metric": {"instance": "d:1"}, "value": [1, "+Inf"]},
                {"metric": {"instance": "e:1"}, "value": [1, "-Inf"]},
                {"metric": {"instance": "f:1"}, "value": [1, "-3.5"]}
            ]}
        }))
        .unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].node, "f");
        assert_eq!(samples[0].value, -3.5);
    }

    #[test]
    fn test_error_status_is_query_failure() {
        let err = parse(json!({
            "status": "error",
            "errorType": "bad_data",
            "error": "parse error at char 4"
        }))
        .unwrap_err();

        match err {
            CollectorError::QueryFailed { status, message } => {
                assert_eq!(status, "bad_data");
                assert!(message.contains("parse error"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_result() {
        let samples = parse(json!({"status": "success", "data": {"resultType": "vector", "result": []}}))
            .unwrap();
        assert!(samples.is_empty());
    }
}
