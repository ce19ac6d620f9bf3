//! Analysis service channel
//!
//! Forwards annotated anomaly payloads to an external analysis service via
//! `POST {base_url}/analyze`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{DeliveryStatus, NotificationSink, SinkError, SinkResult};
use crate::utils::retry::{with_retry_if, RetryConfig};
use crate::utils::truncate_chars;

const ANALYZE_PATH: &str = "/analyze";
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Analysis service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of the analysis service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-attempt request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Retries after the first attempt, timeouts only
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_retries() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::new(default_base_url())
    }
}

impl AnalysisConfig {
    /// Create a configuration with default timeout and retry policy
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    /// Full URL of the analyze endpoint
    pub fn endpoint(&self) -> String {
        format!("{}{ANALYZE_PATH}", self.base_url.trim_end_matches('/'))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.is_empty() {
            return Err("Analysis base URL cannot be empty".to_string());
        }

        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| format!("Invalid analysis base URL '{}': {e}", self.base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err("Analysis base URL must use http:// or https://".to_string());
        }

        if self.timeout_secs == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        Ok(())
    }

    fn retry_policy(&self) -> RetryConfig {
        RetryConfig::fixed(self.max_retries, self.retry_delay_ms)
    }
}

/// HTTP sink for the analysis service
///
/// Each attempt is bounded by `timeout_secs`. Only timeouts are retried;
/// connection failures and non-2xx answers fail the delivery immediately.
///
/// # Example
///
/// ```rust,ignore
/// use nodewatch::notifications::{AnalysisConfig, AnalysisSink, NotificationSink};
///
/// let sink = AnalysisSink::new(AnalysisConfig::new("http://analysis:8000"))?;
/// sink.deliver(&payload).await?;
/// ```
pub struct AnalysisSink {
    config: AnalysisConfig,
    endpoint: String,
    client: Client,
}

impl AnalysisSink {
    /// Create a new analysis sink
    pub fn new(config: AnalysisConfig) -> SinkResult<Self> {
        config.validate().map_err(SinkError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SinkError::InvalidConfig(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            endpoint: config.endpoint(),
            config,
            client,
        })
    }

    /// Target URL
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    async fn post_once(&self, payload: &serde_json::Value) -> SinkResult<()> {
        let response = self.client.post(&self.endpoint).json(payload).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());

        Err(SinkError::Status {
            status: status.as_u16(),
            body: truncate_chars(&body, MAX_ERROR_BODY_CHARS),
        })
    }
}

#[async_trait]
impl NotificationSink for AnalysisSink {
    fn name(&self) -> &str {
        "analysis"
    }

    async fn deliver(&self, payload: &serde_json::Value) -> SinkResult<DeliveryStatus> {
        let policy = self.config.retry_policy();

        let attempts = with_retry_if(
            &policy,
            |attempt| async move {
                self.post_once(payload).await?;
                Ok::<u32, SinkError>(attempt + 1)
            },
            SinkError::is_timeout,
        )
        .await?;

        Ok(DeliveryStatus::delivered(self.name(), attempts)
            .with_message(format!("Delivered to {}", self.endpoint)))
    }
}
