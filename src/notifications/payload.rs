//! Outbound payload construction
//!
//! The analysis endpoint receives the original upstream record with a fixed
//! set of annotation fields merged in at the top level:
//!
//! ```json
//! {
//!   "...": "all fields of the original record",
//!   "metric_name": "disk_write_bytes",
//!   "data_type": "metric",
//!   "anomaly_detected": true,
//!   "severity": "WARNING",
//!   "message": "Disk I/O (disk_write_bytes) rose to 25.00 MB/s ...",
//!   "detection_timestamp": 1705747800
//! }
//! ```
//!
//! `metric_name` is replaced by `"log_type": "error"` for log notifications.
//! Annotations never overwrite a field already present in the record.

use serde_json::{Map, Value};

use super::{DataType, Notification};

pub const FIELD_METRIC_NAME: &str = "metric_name";
pub const FIELD_LOG_TYPE: &str = "log_type";
pub const FIELD_DATA_TYPE: &str = "data_type";
pub const FIELD_ANOMALY_DETECTED: &str = "anomaly_detected";
pub const FIELD_SEVERITY: &str = "severity";
pub const FIELD_MESSAGE: &str = "message";
pub const FIELD_DETECTION_TIMESTAMP: &str = "detection_timestamp";

/// Shallow copy of the record plus the annotation fields
pub fn build_payload(notification: &Notification, detected_at: i64) -> Value {
    let mut body: Map<String, Value> = notification.payload.clone();

    match notification.data_type {
        DataType::Metric => annotate(
            &mut body,
            FIELD_METRIC_NAME,
            Value::from(notification.item_name.as_str()),
        ),
        DataType::Log => annotate(&mut body, FIELD_LOG_TYPE, Value::from("error")),
    }
    annotate(
        &mut body,
        FIELD_DATA_TYPE,
        Value::from(notification.data_type.as_str()),
    );
    annotate(&mut body, FIELD_ANOMALY_DETECTED, Value::Bool(true));
    annotate(
        &mut body,
        FIELD_SEVERITY,
        Value::from(notification.severity.as_str()),
    );
    annotate(
        &mut body,
        FIELD_MESSAGE,
        Value::from(notification.message.as_str()),
    );
    annotate(&mut body, FIELD_DETECTION_TIMESTAMP, Value::from(detected_at));

    Value::Object(body)
}

fn annotate(body: &mut Map<String, Value>, field: &'static str, value: Value) {
    if body.contains_key(field) {
        tracing::debug!(field, "Upstream record already carries field, keeping original");
        return;
    }
    body.insert(field.to_string(), value);
}
