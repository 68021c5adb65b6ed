//! Error taxonomy shared by every probe.
//!
//! Client adapters translate their library errors into [`ProbeError`] at the
//! boundary, so the probe executors and the outcome classifier only ever see
//! these five categories.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Failure raised by a single probe step.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Required configuration or client capability is absent.
    #[error("{0}")]
    ConfigurationMissing(String),

    /// The dependency could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailure(String),

    /// A bounded wait elapsed before the operation completed.
    #[error("{operation} timed out after {}ms: {detail}", waited.as_millis())]
    OperationTimeout {
        operation: &'static str,
        waited: Duration,
        detail: String,
    },

    /// The dependency answered with a non-timeout error.
    #[error("{0}")]
    RemoteProtocol(String),

    #[error("{0}")]
    Unexpected(String),
}

/// Serializable category of a [`ProbeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigurationMissing,
    ConnectionFailure,
    OperationTimeout,
    RemoteProtocol,
    Unexpected,
}

impl ProbeError {
    // ---
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::ConfigurationMissing(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFailure(msg.into())
    }

    pub fn timeout(operation: &'static str, waited: Duration, detail: impl Into<String>) -> Self {
        Self::OperationTimeout {
            operation,
            waited,
            detail: detail.into(),
        }
    }

    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteProtocol(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        // ---
        match self {
            Self::ConfigurationMissing(_) => ErrorKind::ConfigurationMissing,
            Self::ConnectionFailure(_) => ErrorKind::ConnectionFailure,
            Self::OperationTimeout { .. } => ErrorKind::OperationTimeout,
            Self::RemoteProtocol(_) => ErrorKind::RemoteProtocol,
            Self::Unexpected(_) => ErrorKind::Unexpected,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_kind_mapping() {
        // ---
        assert_eq!(
            ProbeError::configuration("x").kind(),
            ErrorKind::ConfigurationMissing
        );
        assert_eq!(
            ProbeError::connection("x").kind(),
            ErrorKind::ConnectionFailure
        );
        assert_eq!(
            ProbeError::timeout("consume", Duration::from_secs(2), "x").kind(),
            ErrorKind::OperationTimeout
        );
        assert_eq!(ProbeError::remote("x").kind(), ErrorKind::RemoteProtocol);
        assert_eq!(ProbeError::unexpected("x").kind(), ErrorKind::Unexpected);
    }

    #[test]
    fn test_timeout_message_names_operation() {
        // ---
        let err = ProbeError::timeout("flush", Duration::from_secs(10), "1 message pending");
        assert_eq!(err.to_string(), "flush timed out after 10000ms: 1 message pending");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        // ---
        let json = serde_json::to_value(ErrorKind::ConfigurationMissing).unwrap();
        assert_eq!(json, "configuration_missing");
    }
}
