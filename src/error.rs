//! Central error types for the time-sync status aggregator
//!
//! Uses `thiserror` for ergonomic, type-safe error handling with
//! automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Central error type for the time-sync status aggregator
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error from kube-rs
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Local I/O error (config file, sockets, subprocess pipes)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Startup configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Required environment variable is not set
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    /// chronyc could not be run or exited unsuccessfully
    #[error("Chrony command failed: {0}")]
    ChronyCommandError(String),

    /// chronyc output could not be parsed
    #[error("Failed to parse chrony output at line {line}: {reason}")]
    ChronyParseError { line: usize, reason: String },

    /// gpsd stream error
    #[error("GPSd stream error: {0}")]
    GpsdError(String),
}

/// Result type alias for aggregator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Check if this error is transient and simply retried on the next tick
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Error::KubeError(_)
                | Error::IoError(_)
                | Error::ChronyCommandError(_)
                | Error::ChronyParseError { .. }
                | Error::GpsdError(_)
        )
    }

    pub(crate) fn chrony_parse(line: usize, reason: impl Into<String>) -> Self {
        Error::ChronyParseError {
            line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(Error::ChronyCommandError("exit status 1".to_string()).is_retriable());
        assert!(Error::chrony_parse(0, "too few columns").is_retriable());
        assert!(Error::GpsdError("connection closed".to_string()).is_retriable());
        assert!(!Error::MissingEnv("NODE_NAME").is_retriable());
        assert!(!Error::ConfigError("empty".to_string()).is_retriable());
    }

    #[test]
    fn test_parse_error_message() {
        let err = Error::chrony_parse(3, "invalid stratum");
        assert_eq!(
            err.to_string(),
            "Failed to parse chrony output at line 3: invalid stratum"
        );
    }
}
