//! Unified error handling for the nodewatch crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! domain errors usable on their own.
//!
//! # Architecture
//!
//! - [`NodewatchError`] - Common interface implemented by all error types
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! Classification and deduplication never fail; only delivery to the sink
//! and upstream collection produce errors.
//!
//! # Usage
//!
//! ```rust,ignore
//! use nodewatch::error::{Error, NodewatchError};
//!
//! fn handle_error(err: Error) {
//!     if err.is_recoverable() {
//!         tracing::warn!(category = %err.category(), "Transient failure: {err}");
//!     } else {
//!         tracing::error!("Fatal error: {err}");
//!     }
//! }
//! ```

use std::fmt;
use thiserror::Error;

pub use crate::collector::CollectorError;
pub use crate::notifications::SinkError;

/// Common trait for all nodewatch error types
pub trait NodewatchError: std::error::Error {
    /// Check if this error is recoverable (a later attempt may succeed)
    fn is_recoverable(&self) -> bool;

    /// Get the error category for handling strategies
    fn category(&self) -> ErrorCategory;
}

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, refused connection)
    Network,
    /// Response decoding and serialization errors
    Parsing,
    /// Configuration and validation errors
    Config,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Parsing => "parsing",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl NodewatchError for SinkError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
            || matches!(self, Self::Status { status, .. } if *status >= 500)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Status { .. } | Self::Request(_) => {
                ErrorCategory::Network
            }
            Self::InvalidConfig(_) => ErrorCategory::Config,
            Self::Serialization(_) => ErrorCategory::Parsing,
        }
    }
}

impl NodewatchError for CollectorError {
    fn is_recoverable(&self) -> bool {
        CollectorError::is_recoverable(self)
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Http(_) | Self::Status { .. } | Self::QueryFailed { .. } => ErrorCategory::Network,
            Self::Decode(_) => ErrorCategory::Parsing,
            Self::InvalidConfig(_) => ErrorCategory::Config,
        }
    }
}

/// Unified error type for the nodewatch crate
#[derive(Error, Debug)]
pub enum Error {
    /// Delivery to the analysis sink failed
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// Querying Prometheus or Loki failed
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

impl NodewatchError for Error {
    fn is_recoverable(&self) -> bool {
        match self {
            Self::Sink(e) => e.is_recoverable(),
            Self::Collector(e) => NodewatchError::is_recoverable(e),
            Self::Config(_) => false,
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Sink(e) => e.category(),
            Self::Collector(e) => e.category(),
            Self::Config(_) => ErrorCategory::Config,
        }
    }
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let timeout: Error = SinkError::Timeout("30s elapsed".into()).into();
        assert_eq!(timeout.category(), ErrorCategory::Network);

        let decode: Error = CollectorError::Decode("missing data".into()).into();
        assert_eq!(decode.category(), ErrorCategory::Parsing);

        let refused: Error = SinkError::Connect("connection refused".into()).into();
        assert_eq!(refused.category(), ErrorCategory::Network);
        assert!(refused.is_recoverable());
    }

    #[test]
    fn test_is_recoverable() {
        let timeout: Error = SinkError::Timeout("slow".into()).into();
        assert!(timeout.is_recoverable());

        let rejected: Error = SinkError::Status {
            status: 400,
            body: "bad payload".into(),
        }
        .into();
        assert!(!rejected.is_recoverable());

        let unavailable: Error = CollectorError::Status {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(unavailable.is_recoverable());
    }

    #[test]
    fn test_error_conversion() {
        let unified: Error = SinkError::InvalidConfig("empty url".into()).into();
        assert!(matches!(unified, Error::Sink(_)));
        assert_eq!(unified.category(), ErrorCategory::Config);
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("Invalid base URL");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "Config error: Invalid base URL");
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Network.to_string(), "network");
        assert_eq!(ErrorCategory::Parsing.to_string(), "parsing");
    }
}
