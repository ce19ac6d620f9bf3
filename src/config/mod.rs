//! Configuration management for nodewatch
//!
//! This module handles loading and validating configuration from environment variables
//! and TOML files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::baseline::{BaselineConfig, DEFAULT_EMA_ALPHA, DEFAULT_HISTORY_CAPACITY, DEFAULT_READY_THRESHOLD};
use crate::collector::{LokiConfig, PrometheusConfig, ScheduleConfig};
use crate::notifications::{AnalysisConfig, DEFAULT_COOLDOWN_SECS};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Analysis service receiving anomaly payloads
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Baseline and cooldown tuning
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Metrics source
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Log source
    #[serde(default)]
    pub loki: LokiConfig,

    /// Scan intervals
    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Detection tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Minimum seconds between repeats of the same notification
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: i64,

    /// Raw values retained per (node, metric)
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Samples required before the baseline is used
    #[serde(default = "default_ready_threshold")]
    pub ready_threshold: usize,

    /// EMA smoothing factor
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,
}

fn default_cooldown() -> i64 {
    DEFAULT_COOLDOWN_SECS
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_ready_threshold() -> usize {
    DEFAULT_READY_THRESHOLD
}

fn default_ema_alpha() -> f64 {
    DEFAULT_EMA_ALPHA
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown(),
            history_capacity: default_history_capacity(),
            ready_threshold: default_ready_threshold(),
            ema_alpha: default_ema_alpha(),
        }
    }
}

impl DetectionConfig {
    /// Baseline settings for the tracker
    pub fn baseline(&self) -> BaselineConfig {
        BaselineConfig {
            history_capacity: self.history_capacity,
            ready_threshold: self.ready_threshold,
            ema_alpha: self.ema_alpha,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    String::from("info")
}

fn default_log_format() -> String {
    String::from("text")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Override fields from environment variables that are set
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("NODEWATCH_ANALYSIS_URL") {
            self.analysis.base_url = url;
        }
        if let Some(timeout) = env_parse("NODEWATCH_ANALYSIS_TIMEOUT") {
            self.analysis.timeout_secs = timeout;
        }
        if let Some(cooldown) = env_parse("NODEWATCH_COOLDOWN_SECS") {
            self.detection.cooldown_secs = cooldown;
        }

        if let Ok(url) = std::env::var("PROMETHEUS_URL") {
            self.prometheus.base_url = url;
        }

        if let Ok(url) = std::env::var("LOKI_URL") {
            self.loki.base_url = url;
        }
        if let Ok(username) = std::env::var("LOKI_USERNAME") {
            self.loki.username = Some(username);
        }
        if let Ok(password) = std::env::var("LOKI_PASSWORD") {
            self.loki.password = Some(password);
        }
        if let Ok(api_key) = std::env::var("LOKI_API_KEY") {
            self.loki.api_key = Some(api_key);
        }

        if let Ok(level) = std::env::var("NODEWATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("NODEWATCH_LOG_FORMAT") {
            self.logging.format = format;
        }
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.analysis
            .validate()
            .map_err(|e| anyhow::anyhow!("analysis: {e}"))?;

        validate_url("prometheus.base_url", &self.prometheus.base_url)?;
        validate_url("loki.base_url", &self.loki.base_url)?;

        if self.prometheus.query_timeout_secs == 0 {
            anyhow::bail!("prometheus.query_timeout_secs must be greater than 0");
        }
        if self.loki.query_timeout_secs == 0 {
            anyhow::bail!("loki.query_timeout_secs must be greater than 0");
        }

        if self.detection.cooldown_secs < 0 {
            anyhow::bail!("detection.cooldown_secs must not be negative");
        }
        if self.detection.history_capacity == 0 {
            anyhow::bail!("detection.history_capacity must be greater than 0");
        }
        if self.detection.ready_threshold > self.detection.history_capacity {
            anyhow::bail!(
                "detection.ready_threshold ({}) cannot exceed history_capacity ({})",
                self.detection.ready_threshold,
                self.detection.history_capacity
            );
        }
        if !(self.detection.ema_alpha > 0.0 && self.detection.ema_alpha <= 1.0) {
            anyhow::bail!("detection.ema_alpha must be in (0, 1]");
        }

        if self.schedule.metric_interval_secs == 0 {
            anyhow::bail!("schedule.metric_interval_secs must be greater than 0");
        }
        if self.schedule.error_log_interval_secs == 0 {
            anyhow::bail!("schedule.error_log_interval_secs must be greater than 0");
        }
        if self.schedule.error_log_query.trim().is_empty() {
            anyhow::bail!("schedule.error_log_query cannot be empty");
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let parsed =
        url::Url::parse(value).with_context(|| format!("{field} is not a valid URL: '{value}'"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{field} must use http:// or https://");
    }
    Ok(())
}
