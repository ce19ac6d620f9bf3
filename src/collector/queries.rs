//! PromQL catalog polled on every metric scan
//!
//! Every query aggregates by the identifying labels so each result maps to
//! exactly one node. Names must match the metric kinds known to the
//! classifier.

/// A metric name and the PromQL that produces it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricQuery {
    pub metric_name: &'static str,
    pub promql: &'static str,
}

macro_rules! rate_sum {
    ($name:literal, $expr:literal) => {
        MetricQuery {
            metric_name: $name,
            promql: concat!(
                "sum by (instance, job, namespace, container, endpoint, pod, service) (",
                $expr,
                ")"
            ),
        }
    };
}

/// Queries in scan order
pub const METRIC_QUERIES: &[MetricQuery] = &[
    MetricQuery {
        metric_name: "cpu_usage_percent",
        promql: "100 - (avg by (instance, job, namespace, container, endpoint, pod, service) (rate(node_cpu_seconds_total{mode=\"idle\"}[5m])) * 100)",
    },
    MetricQuery {
        metric_name: "memory_usage_percent",
        promql: "(1 - (node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)) * 100",
    },
    rate_sum!("disk_read_iops", "rate(node_disk_reads_completed_total[5m])"),
    rate_sum!("disk_write_iops", "rate(node_disk_writes_completed_total[5m])"),
    rate_sum!("disk_read_bytes", "rate(node_disk_read_bytes_total[5m])"),
    rate_sum!("disk_write_bytes", "rate(node_disk_written_bytes_total[5m])"),
    rate_sum!(
        "net_rx_bytes",
        "rate(node_network_receive_bytes_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!(
        "net_tx_bytes",
        "rate(node_network_transmit_bytes_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!(
        "net_rx_errors",
        "rate(node_network_receive_errs_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!(
        "net_tx_errors",
        "rate(node_network_transmit_errs_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!(
        "net_dropped",
        "rate(node_network_receive_drop_total{device!=\"lo\"}[5m]) + rate(node_network_transmit_drop_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!("context_switches", "rate(node_context_switches_total[5m])"),
    rate_sum!(
        "packet_drops",
        "rate(node_network_receive_packets_dropped_total{device!=\"lo\"}[5m])"
    ),
    rate_sum!("tcp_retransmits", "rate(node_sockstat_TCP_retrans[5m])"),
];

/// Look up the query for a metric name
pub fn query_for(metric_name: &str) -> Option<&'static MetricQuery> {
    METRIC_QUERIES.iter().find(|q| q.metric_name == metric_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::MetricKind;
    use std::collections::HashSet;

    #[test]
    fn test_every_query_has_a_metric_kind() {
        for query in METRIC_QUERIES {
            assert!(
                MetricKind::from_metric_name(query.metric_name).is_some(),
                "{} has no detection rule",
                query.metric_name
            );
        }
    }

    #[test]
    fn test_catalog_is_complete_and_unique() {
        let names: HashSet<_> = METRIC_QUERIES.iter().map(|q| q.metric_name).collect();
        assert_eq!(names.len(), METRIC_QUERIES.len());
        assert_eq!(METRIC_QUERIES.len(), 14);
    }

    #[test]
    fn test_rate_queries_group_by_instance() {
        let query = query_for("disk_write_bytes").unwrap();
        assert!(query.promql.starts_with("sum by (instance,"));
        assert!(query.promql.contains("node_disk_written_bytes_total"));
    }
}
