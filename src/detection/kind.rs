//! Registry of supported metric kinds

use super::policy::{self, CPU_USAGE, DISK_BYTES, MEMORY_USAGE, NET_BYTES};
use super::Verdict;

/// Closed set of detection rules, one variant per metric family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    CpuUsage,
    MemoryUsage,
    DiskIops,
    DiskBytes,
    NetBytes,
    NetDropped,
    ContextSwitches,
    /// Error-style counters judged purely by amplification
    ErrorCounter,
}

/// Metric names accepted from the collector and the rule each maps to
pub const METRIC_KINDS: &[(&str, MetricKind)] = &[
    ("cpu_usage_percent", MetricKind::CpuUsage),
    ("memory_usage_percent", MetricKind::MemoryUsage),
    ("disk_read_iops", MetricKind::DiskIops),
    ("disk_write_iops", MetricKind::DiskIops),
    ("disk_read_bytes", MetricKind::DiskBytes),
    ("disk_write_bytes", MetricKind::DiskBytes),
    ("net_rx_bytes", MetricKind::NetBytes),
    ("net_tx_bytes", MetricKind::NetBytes),
    ("net_dropped", MetricKind::NetDropped),
    ("context_switches", MetricKind::ContextSwitches),
    ("net_rx_errors", MetricKind::ErrorCounter),
    ("net_tx_errors", MetricKind::ErrorCounter),
    ("packet_drops", MetricKind::ErrorCounter),
    ("tcp_retransmits", MetricKind::ErrorCounter),
];

impl MetricKind {
    /// Look up the rule for a metric name, `None` if unsupported
    pub fn from_metric_name(metric_name: &str) -> Option<Self> {
        METRIC_KINDS
            .iter()
            .find(|(name, _)| *name == metric_name)
            .map(|(_, kind)| *kind)
    }

    /// Whether the rule ever consults the baseline
    pub fn uses_baseline(&self) -> bool {
        !matches!(self, Self::CpuUsage | Self::MemoryUsage | Self::DiskIops)
    }

    /// Apply the rule to a value and its ready baseline
    pub fn evaluate(&self, metric_name: &str, value: f64, baseline: Option<f64>) -> Verdict {
        match self {
            Self::CpuUsage => policy::percent_gauge(value, &CPU_USAGE),
            Self::MemoryUsage => policy::percent_gauge(value, &MEMORY_USAGE),
            Self::DiskIops => policy::disk_iops(metric_name, value),
            Self::DiskBytes => policy::throughput(metric_name, value, baseline, &DISK_BYTES),
            Self::NetBytes => policy::throughput(metric_name, value, baseline, &NET_BYTES),
            Self::NetDropped => policy::net_dropped(value, baseline),
            Self::ContextSwitches => policy::context_switches(value, baseline),
            Self::ErrorCounter => policy::error_amplification(metric_name, value, baseline),
        }
    }
}
