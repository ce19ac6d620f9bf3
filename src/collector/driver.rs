//! Periodic scan loops
//!
//! Two independent tickers feed the pipeline:
//!
//! - **metric scan** (every 10s): runs every catalogued PromQL query
//!   concurrently and feeds each resulting sample.
//! - **error-log scan** (every 10min): reads the last lookback window of
//!   error lines from Loki and feeds the ones the cursor has not seen.
//!
//! Both loops skip missed ticks and stop on a shared watch signal. Upstream
//! failures are logged and counted; they never stop a loop.

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::{CollectorError, LogCursor, LokiClient, PrometheusClient, METRIC_QUERIES};
use crate::baseline::BaselineTracker;
use crate::config::Config;
use crate::detection::AnomalyClassifier;
use crate::error::{Error, NodewatchError};
use crate::metrics;
use crate::notifications::{AnalysisSink, NotificationDeduplicator};
use crate::pipeline::{AnomalyPipeline, ERROR_LOG_ITEM};

/// Scan intervals and the error-log query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_metric_interval")]
    pub metric_interval_secs: u64,
    #[serde(default = "default_error_log_interval")]
    pub error_log_interval_secs: u64,
    /// Width of the Loki window read on each error-log scan
    #[serde(default = "default_error_log_lookback")]
    pub error_log_lookback_secs: u64,
    #[serde(default = "default_error_log_query")]
    pub error_log_query: String,
    /// How often a metrics snapshot is logged; 0 disables the report
    #[serde(default = "default_metrics_report_interval")]
    pub metrics_report_interval_secs: u64,
}

fn default_metric_interval() -> u64 {
    10
}

fn default_error_log_interval() -> u64 {
    600
}

fn default_error_log_lookback() -> u64 {
    600
}

fn default_metrics_report_interval() -> u64 {
    300
}

fn default_error_log_query() -> String {
    r#"{level="error"} | json"#.to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            metric_interval_secs: default_metric_interval(),
            error_log_interval_secs: default_error_log_interval(),
            error_log_lookback_secs: default_error_log_lookback(),
            error_log_query: default_error_log_query(),
            metrics_report_interval_secs: default_metrics_report_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn metric_interval(&self) -> Duration {
        Duration::from_secs(self.metric_interval_secs)
    }

    pub fn error_log_interval(&self) -> Duration {
        Duration::from_secs(self.error_log_interval_secs)
    }

    pub fn metrics_report_interval(&self) -> Option<Duration> {
        (self.metrics_report_interval_secs > 0)
            .then(|| Duration::from_secs(self.metrics_report_interval_secs))
    }
}

/// Summary of one scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Samples or log lines handed to the pipeline
    pub fed: usize,
    /// Offers that resulted in a send
    pub dispatched: usize,
    /// Upstream queries that failed
    pub failed_queries: usize,
}

/// Owns the collectors and the pipeline they feed
#[derive(Clone)]
pub struct Driver {
    pipeline: Arc<AnomalyPipeline>,
    prometheus: Arc<PrometheusClient>,
    loki: Arc<LokiClient>,
    cursor: Arc<LogCursor>,
    schedule: ScheduleConfig,
    shutdown: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Driver {
    pub fn new(
        pipeline: Arc<AnomalyPipeline>,
        prometheus: PrometheusClient,
        loki: LokiClient,
        schedule: ScheduleConfig,
    ) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        Self {
            pipeline,
            prometheus: Arc::new(prometheus),
            loki: Arc::new(loki),
            cursor: Arc::new(LogCursor::new()),
            schedule,
            shutdown,
            shutdown_rx,
        }
    }

    /// Wire the analysis sink, pipeline and both collectors from configuration
    pub fn from_config(config: &Config) -> crate::error::Result<Self> {
        config
            .validate()
            .map_err(|e| Error::config(format!("{e:#}")))?;

        let sink = AnalysisSink::new(config.analysis.clone())?;
        tracing::info!(endpoint = %sink.endpoint(), "Analysis sink configured");

        let tracker = BaselineTracker::with_config(config.detection.baseline());
        let dedup = NotificationDeduplicator::with_cooldown(Arc::new(sink), config.detection.cooldown_secs);
        let pipeline = AnomalyPipeline::new(
            AnomalyClassifier::new(Arc::new(tracker)),
            Arc::new(dedup),
        );

        Ok(Self::new(
            Arc::new(pipeline),
            PrometheusClient::new(&config.prometheus)?,
            LokiClient::new(&config.loki)?,
            config.schedule.clone(),
        ))
    }

    pub fn pipeline(&self) -> &Arc<AnomalyPipeline> {
        &self.pipeline
    }

    pub fn cursor(&self) -> &Arc<LogCursor> {
        &self.cursor
    }

    /// Spawn both scan loops
    pub fn start(&self) -> DriverHandle {
        tracing::info!(
            metric_interval_secs = self.schedule.metric_interval_secs,
            error_log_interval_secs = self.schedule.error_log_interval_secs,
            "Starting collection loops"
        );

        DriverHandle {
            metric_handle: self.spawn_metric_loop(),
            log_handle: self.spawn_error_log_loop(),
            report_handle: self.spawn_metrics_report_loop(),
            shutdown: self.shutdown.clone(),
            pipeline: Arc::clone(&self.pipeline),
        }
    }

    /// Query every catalogued metric once and feed the results
    pub async fn scan_metrics(&self) -> ScanStats {
        let queries = METRIC_QUERIES
            .iter()
            .map(|q| self.prometheus.query(q.metric_name, q.promql));
        let results = join_all(queries).await;

        let mut stats = ScanStats::default();
        for (query, result) in METRIC_QUERIES.iter().zip(results) {
            match result {
                Ok(samples) => {
                    for sample in samples {
                        stats.fed += 1;
                        if self.pipeline.feed_metric(sample).is_dispatched() {
                            stats.dispatched += 1;
                        }
                    }
                }
                Err(e) => {
                    stats.failed_queries += 1;
                    record_query_failure("prometheus", query.metric_name, &e);
                }
            }
        }

        tracing::debug!(
            fed = stats.fed,
            dispatched = stats.dispatched,
            failed = stats.failed_queries,
            "Metric scan complete"
        );
        stats
    }

    /// Read the lookback window ending at `end_secs` and feed unseen lines
    pub async fn scan_error_logs(&self, end_secs: i64) -> ScanStats {
        let start_secs = end_secs - self.schedule.error_log_lookback_secs as i64;
        let mut stats = ScanStats::default();

        let records = match self
            .loki
            .query_range(&self.schedule.error_log_query, start_secs, end_secs)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                stats.failed_queries += 1;
                record_query_failure("loki", ERROR_LOG_ITEM, &e);
                return stats;
            }
        };

        let evicted = self.cursor.evict_older_than(start_secs);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.cursor.len(), "Evicted stale log cursor entries");
        }

        for record in &records {
            if !self.cursor.advance(record) {
                continue;
            }
            stats.fed += 1;
            if self.pipeline.feed_error_record(record).is_dispatched() {
                stats.dispatched += 1;
            }
        }

        tracing::info!(
            lines = records.len(),
            fed = stats.fed,
            dispatched = stats.dispatched,
            "Error log scan complete"
        );
        stats
    }

    fn spawn_metric_loop(&self) -> tokio::task::JoinHandle<()> {
        let driver = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(driver.schedule.metric_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        driver.scan_metrics().await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Metric scan loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_error_log_loop(&self) -> tokio::task::JoinHandle<()> {
        let driver = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = interval(driver.schedule.error_log_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        driver.scan_error_logs(Utc::now().timestamp()).await;
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::info!("Error log scan loop shutting down");
                        break;
                    }
                }
            }
        })
    }

    fn spawn_metrics_report_loop(&self) -> Option<tokio::task::JoinHandle<()>> {
        let period = self.schedule.metrics_report_interval()?;
        let pipeline = Arc::clone(&self.pipeline);
        let mut shutdown_rx = self.shutdown_rx.clone();

        Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // skip the immediate first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        metrics::update_tracked_keys(pipeline.dedup().tracked_keys());
                        match metrics::metrics_snapshot().map_err(|e| e.to_string()) {
                            Ok(snapshot) if !snapshot.is_empty() => {
                                tracing::info!(snapshot = %snapshot, "Metrics snapshot");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("Failed to gather metrics: {e}"),
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }
        }))
    }
}

fn record_query_failure(source: &'static str, item: &str, e: &CollectorError) {
    let category = e.category();
    metrics::record_collector_error(source, category.as_str());

    if e.is_connect() {
        tracing::debug!(source, item = %item, category = %category, "Upstream unreachable: {e}");
    } else {
        tracing::warn!(
            source,
            item = %item,
            category = %category,
            recoverable = e.is_recoverable(),
            "Upstream query failed: {e}"
        );
    }
}

/// Handle to the running scan loops
pub struct DriverHandle {
    metric_handle: tokio::task::JoinHandle<()>,
    log_handle: tokio::task::JoinHandle<()>,
    report_handle: Option<tokio::task::JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
    pipeline: Arc<AnomalyPipeline>,
}

impl DriverHandle {
    /// Wait for both loops to finish
    pub async fn wait(self) {
        let _ = tokio::join!(self.metric_handle, self.log_handle);
        if let Some(report) = self.report_handle {
            let _ = report.await;
        }
    }

    /// Stop new notifications, then stop the loops and wait for them
    pub async fn shutdown(self) {
        self.pipeline.shutdown();
        let _ = self.shutdown.send(true);
        self.wait().await;
    }

    pub fn is_running(&self) -> bool {
        !self.metric_handle.is_finished()
            && !self.log_handle.is_finished()
            && self.report_handle.as_ref().map_or(true, |h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_defaults() {
        let schedule = ScheduleConfig::default();
        assert_eq!(schedule.metric_interval(), Duration::from_secs(10));
        assert_eq!(schedule.error_log_interval(), Duration::from_secs(600));
        assert_eq!(schedule.error_log_lookback_secs, 600);
        assert_eq!(schedule.error_log_query, r#"{level="error"} | json"#);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = Config::default();
        config.analysis.base_url = "not a url".to_string();

        let err = Driver::from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Config(_)), "got {err:?}");
        assert_eq!(err.category().as_str(), "config");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("analysis"));
    }

    #[test]
    fn test_metrics_report_interval() {
        let mut schedule = ScheduleConfig::default();
        assert_eq!(schedule.metrics_report_interval(), Some(Duration::from_secs(300)));

        schedule.metrics_report_interval_secs = 0;
        assert_eq!(schedule.metrics_report_interval(), None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_all_loops() {
        let mut config = Config::default();
        config.prometheus.base_url = "http://127.0.0.1:1".to_string();
        config.loki.base_url = "http://127.0.0.1:1".to_string();
        config.schedule.metrics_report_interval_secs = 1;

        let handle = Driver::from_config(&config).unwrap().start();
        assert!(handle.is_running());
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_from_config_applies_cooldown() {
        let mut config = Config::default();
        config.detection.cooldown_secs = 60;

        let driver = Driver::from_config(&config).unwrap();
        assert_eq!(driver.pipeline().dedup().cooldown_secs(), 60);
    }

    #[test]
    fn test_schedule_partial_toml() {
        let schedule: ScheduleConfig = toml::from_str("metric_interval_secs = 30").unwrap();
        assert_eq!(schedule.metric_interval_secs, 30);
        assert_eq!(schedule.error_log_interval_secs, 600);
    }
}
