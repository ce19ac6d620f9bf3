//! Loki range-query client for error log lines

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{CollectorError, CollectorResult, ErrorLogRecord};

/// Loki connection settings
///
/// Basic auth is used when both `username` and `password` are set,
/// otherwise `api_key` is sent as `X-API-Key` when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LokiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:3100".to_string()
}

fn default_query_timeout() -> u64 {
    30
}

impl Default for LokiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            query_timeout_secs: default_query_timeout(),
            username: None,
            password: None,
            api_key: None,
        }
    }
}

impl LokiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn auth(&self) -> LokiAuth {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        match (non_empty(&self.username), non_empty(&self.password)) {
            (Some(username), Some(password)) => LokiAuth::Basic { username, password },
            _ => match non_empty(&self.api_key) {
                Some(key) => LokiAuth::ApiKey(key),
                None => LokiAuth::None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LokiAuth {
    None,
    Basic { username: String, password: String },
    ApiKey(String),
}

#[derive(Debug, Deserialize)]
struct LokiResponse {
    status: String,
    #[serde(default)]
    data: Option<LokiData>,
}

#[derive(Debug, Deserialize)]
struct LokiData {
    #[serde(default)]
    result: Vec<LokiStream>,
}

#[derive(Debug, Deserialize)]
struct LokiStream {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    /// `[[ts_nanos, line], ...]`, optionally with a structured metadata
    /// object as a third element
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Client for the Loki HTTP API
pub struct LokiClient {
    endpoint: String,
    auth: LokiAuth,
    client: Client,
}

impl LokiClient {
    pub fn new(config: &LokiConfig) -> CollectorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.query_timeout_secs))
            .build()
            .map_err(|e| CollectorError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        let auth = config.auth();
        let auth_mode = match &auth {
            LokiAuth::None => "none",
            LokiAuth::Basic { .. } => "basic",
            LokiAuth::ApiKey(_) => "api-key",
        };
        tracing::info!(base_url = %config.base_url, auth = auth_mode, "Loki client initialized");

        Ok(Self {
            endpoint: format!(
                "{}/loki/api/v1/query_range",
                config.base_url.trim_end_matches('/')
            ),
            auth,
            client,
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            LokiAuth::None => request,
            LokiAuth::Basic { username, password } => request.basic_auth(username, Some(password)),
            LokiAuth::ApiKey(key) => request.header("X-API-Key", key),
        }
    }

    /// Fetch log lines matching `logql` between two unix-second bounds
    pub async fn query_range(
        &self,
        logql: &str,
        start_secs: i64,
        end_secs: i64,
    ) -> CollectorResult<Vec<ErrorLogRecord>> {
        tracing::debug!(query = %logql, start = start_secs, end = end_secs, "Loki range query");

        let request = self.client.get(&self.endpoint).query(&[
            ("query", logql.to_string()),
            ("start", start_secs.to_string()),
            ("end", end_secs.to_string()),
        ]);
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: LokiResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::Decode(e.to_string()))?;

        records_from_response(body)
    }
}

fn records_from_response(body: LokiResponse) -> CollectorResult<Vec<ErrorLogRecord>> {
    if body.status != "success" {
        return Err(CollectorError::QueryFailed {
            status: body.status,
            message: "Loki reported a failed query".to_string(),
        });
    }

    let streams = body.data.map(|d| d.result).unwrap_or_default();
    let mut records = Vec::new();
    for stream in streams {
        for entry in stream.values {
            let (Some(timestamp_nanos), Some(line)) = (
                entry.first().and_then(Value::as_str),
                entry.get(1).and_then(Value::as_str),
            ) else {
                tracing::debug!(entry = ?entry, "Skipping malformed log entry");
                continue;
            };
            records.push(ErrorLogRecord {
                stream_labels: stream.stream.clone(),
                line: line.to_string(),
                timestamp_nanos: timestamp_nanos.to_string(),
            });
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_auth_selection() {
        assert_eq!(LokiConfig::default().auth(), LokiAuth::None);
        assert_eq!(
            LokiConfig::default().with_api_key("k").auth(),
            LokiAuth::ApiKey("k".into())
        );
        assert_eq!(
            LokiConfig::default()
                .with_basic_auth("user", "pass")
                .with_api_key("k")
                .auth(),
            LokiAuth::Basic {
                username: "user".into(),
                password: "pass".into()
            }
        );

        // Blank password falls through to the API key
        let blank = LokiConfig::default().with_basic_auth("user", "").with_api_key("k");
        assert_eq!(blank.auth(), LokiAuth::ApiKey("k".into()));
    }

    #[test]
    fn test_streams_flatten_into_records() {
        let body: LokiResponse = serde_json::from_value(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {"stream": {"level": "error", "instance": "10.0.2.131:9100"},
                     "values": [["1705747800000000000", "boom"], ["1705747801000000000", "bang"]]},
                    {"stream": {"level": "error", "pod": "api-0"},
                     "values": [["1705747802000000000"]]}
                ]
            }
        }))
        .unwrap();

        let records = records_from_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, "boom");
        assert_eq!(records[0].timestamp_nanos, "1705747800000000000");
        assert_eq!(records[1].stream_labels["instance"], "10.0.2.131:9100");
    }

    #[test]
    fn test_entries_with_structured_metadata() {
        let body: LokiResponse = serde_json::from_value(json!({
            "status": "success",
            "data": {
                "resultType": "streams",
                "result": [
                    {"stream": {"level": "error"},
                     "values": [
                         ["1705747800000000000", "boom", {"trace_id": "abc123"}],
                         ["1705747801000000000", "bang"],
                         [1705747802, "numeric stamp"]
                     ]}
                ]
            }
        }))
        .unwrap();

        let records = records_from_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, "boom");
        assert_eq!(records[0].timestamp_nanos, "1705747800000000000");
        assert_eq!(records[1].line, "bang");
    }

    #[test]
    fn test_failed_status() {
        let body: LokiResponse = serde_json::from_value(json!({"status": "error"})).unwrap();
        assert!(matches!(
            records_from_response(body),
            Err(CollectorError::QueryFailed { .. })
        ));
    }
}
