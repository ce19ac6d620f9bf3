//! Metric anomaly classification
//!
//! Turns a raw sample plus the rolling baseline for its `(node, metric)` key
//! into a [`Verdict`]. All state lives in the [`BaselineTracker`]; the rules
//! themselves are pure functions selected by [`MetricKind`].
//!
//! ```text
//!   sample ──▶ BaselineTracker::update ──▶ MetricKind::evaluate ──▶ Verdict
//! ```
//!
//! [`BaselineTracker`]: crate::baseline::BaselineTracker

mod classifier;
pub mod kind;
pub mod policy;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classifier::AnomalyClassifier;
pub use kind::MetricKind;

/// Severity of a classified sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Within expected bounds, never forwarded
    Normal,
    /// Needs attention
    Warning,
    /// Needs immediate action
    Critical,
}

impl Severity {
    /// Wire name used in outbound payloads and notification keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn is_anomaly(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of classifying one sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub severity: Severity,
    /// Human-readable rationale, present whenever a rule fired
    pub message: Option<String>,
}

impl Verdict {
    pub fn normal() -> Self {
        Self {
            severity: Severity::Normal,
            message: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: Some(message.into()),
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            message: Some(message.into()),
        }
    }

    pub fn is_anomaly(&self) -> bool {
        self.severity.is_anomaly()
    }

    /// Message text, empty for NORMAL verdicts
    pub fn message_text(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_wire_names() {
        assert_eq!(Severity::Normal.as_str(), "NORMAL");
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(
            serde_json::to_value(Severity::Critical).unwrap(),
            serde_json::json!("CRITICAL")
        );
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Normal);
    }

    #[test]
    fn test_verdict_constructors() {
        let normal = Verdict::normal();
        assert!(!normal.is_anomaly());
        assert_eq!(normal.message_text(), "");

        let warning = Verdict::warning("disk busy");
        assert!(warning.is_anomaly());
        assert_eq!(warning.message_text(), "disk busy");
    }
}
