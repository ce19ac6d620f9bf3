//! Progress tracking for overlapping log windows
//!
//! Each error-log scan re-reads a lookback window that may overlap the
//! previous one. The cursor remembers, per stream and line content, the
//! newest log time already handed to the pipeline.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

use super::ErrorLogRecord;
use crate::notifications::message_digest;

/// Newest processed log time (unix seconds) per stream and line
#[derive(Debug, Default)]
pub struct LogCursor {
    last_processed: DashMap<String, i64>,
}

impl LogCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `record` and report whether it is newer than anything seen
    /// for the same stream and line
    pub fn advance(&self, record: &ErrorLogRecord) -> bool {
        self.advance_at(record, Utc::now().timestamp())
    }

    /// Same as [`advance`](Self::advance) with `now` used for unparsable stamps
    pub fn advance_at(&self, record: &ErrorLogRecord, now: i64) -> bool {
        let key = cursor_key(&record.stream_labels, &record.line);
        let log_time = log_time_secs(&record.timestamp_nanos, now);

        let mut last = self.last_processed.entry(key).or_insert(i64::MIN);
        if log_time > *last {
            *last = log_time;
            true
        } else {
            tracing::debug!(last_processed = *last, log_time, "Skipping already processed log line");
            false
        }
    }

    /// Drop entries whose newest log time is before `cutoff_secs`
    ///
    /// Lines that old fall outside every later window, so their entries can
    /// never suppress anything again. Returns the number removed.
    pub fn evict_older_than(&self, cutoff_secs: i64) -> usize {
        let before = self.last_processed.len();
        self.last_processed.retain(|_, last| *last >= cutoff_secs);
        before.saturating_sub(self.last_processed.len())
    }

    pub fn len(&self) -> usize {
        self.last_processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_processed.is_empty()
    }
}

fn cursor_key(labels: &BTreeMap<String, String>, line: &str) -> String {
    let labels = labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{labels}}}:{}", message_digest(line))
}

/// Loki nanosecond stamps keep only their leading 10 digits (seconds)
fn log_time_secs(timestamp: &str, now: i64) -> i64 {
    let seconds = if timestamp.len() > 10 {
        timestamp.get(..10)
    } else {
        Some(timestamp)
    };

    match seconds.and_then(|s| s.parse::<i64>().ok()) {
        Some(secs) => secs,
        None => {
            tracing::warn!(timestamp = %timestamp, "Unparsable log timestamp, using current time");
            now
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ts: &str, line: &str) -> ErrorLogRecord {
        ErrorLogRecord {
            stream_labels: BTreeMap::from([("level".to_string(), "error".to_string())]),
            line: line.to_string(),
            timestamp_nanos: ts.to_string(),
        }
    }

    #[test]
    fn test_log_time_truncates_nanoseconds() {
        assert_eq!(log_time_secs("1705747800123456789", 0), 1_705_747_800);
        assert_eq!(log_time_secs("1705747800", 0), 1_705_747_800);
        assert_eq!(log_time_secs("not-a-time", 42), 42);
        assert_eq!(log_time_secs("", 42), 42);
    }

    #[test]
    fn test_same_line_is_fresh_once_per_time() {
        let cursor = LogCursor::new();

        assert!(cursor.advance_at(&record("1705747800000000000", "boom"), 0));
        assert!(!cursor.advance_at(&record("1705747800000000000", "boom"), 0));
        // same second, different nanos
        assert!(!cursor.advance_at(&record("1705747800500000000", "boom"), 0));
        assert!(cursor.advance_at(&record("1705747801000000000", "boom"), 0));
        assert!(!cursor.advance_at(&record("1705747700000000000", "boom"), 0));
    }

    #[test]
    fn test_distinct_lines_and_streams_are_independent() {
        let cursor = LogCursor::new();
        let ts = "1705747800000000000";

        assert!(cursor.advance_at(&record(ts, "boom"), 0));
        assert!(cursor.advance_at(&record(ts, "bang"), 0));

        let mut other_stream = record(ts, "boom");
        other_stream
            .stream_labels
            .insert("pod".to_string(), "api-0".to_string());
        assert!(cursor.advance_at(&other_stream, 0));

        assert_eq!(cursor.len(), 3);
    }

    #[test]
    fn test_evict_older_than_window_start() {
        let cursor = LogCursor::new();
        assert!(cursor.advance_at(&record("1705747000000000000", "old"), 0));
        assert!(cursor.advance_at(&record("1705747800000000000", "edge"), 0));
        assert!(cursor.advance_at(&record("1705748000000000000", "new"), 0));

        assert_eq!(cursor.evict_older_than(1_705_747_800), 1);
        assert_eq!(cursor.len(), 2);

        // edge entry is still held and suppresses its replay
        assert!(!cursor.advance_at(&record("1705747800000000000", "edge"), 0));
        assert_eq!(cursor.evict_older_than(1_705_747_800), 0);
    }
}
