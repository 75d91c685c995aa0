use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The call exceeded the transport's own timeout.
    Timeout,
    /// The remote answered with a status the transport classifies as failure.
    Status { status: u16 },
    /// The response could not be read or decoded.
    Decode,
    /// Anything else the transport reports.
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportErrorKind::Connect => write!(f, "connect"),
            TransportErrorKind::Timeout => write!(f, "timeout"),
            TransportErrorKind::Status { status } => write!(f, "status {}", status),
            TransportErrorKind::Decode => write!(f, "decode"),
            TransportErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Error raised by the external transport collaborator.
///
/// Every transport error is retryable up to the policy limit; the pipeline
/// never hands one to the caller directly but wraps it in an
/// [`Outcome`](crate::Outcome).
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Transport error ({kind}): {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connect, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Status { status }, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    /// HTTP status carried by a `Status` error.
    pub fn status_code(&self) -> Option<u16> {
        match self.kind {
            TransportErrorKind::Status { status } => Some(status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == TransportErrorKind::Timeout
    }
}

/// Errors surfaced by the pipeline itself rather than by the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request cancelled by caller")]
    Cancelled,

    #[error("Attempt sequence panicked: {0}")]
    AttemptPanicked(String),

    #[error("Attempt sequence aborted before producing a result")]
    Aborted,
}

impl PipelineError {
    pub fn configuration(message: impl Into<String>) -> Self {
        PipelineError::Configuration(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::status(503, "service unavailable");
        assert_eq!(
            error.to_string(),
            "Transport error (status 503): service unavailable"
        );
        assert_eq!(error.status_code(), Some(503));
        assert!(!error.is_timeout());
    }

    #[test]
    fn test_transport_error_kind_serialization() {
        let kind = TransportErrorKind::Status { status: 500 };
        let json = serde_json::to_value(kind).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "status", "status": 500}));
    }

    #[test]
    fn test_pipeline_error_cancelled() {
        assert!(PipelineError::Cancelled.is_cancelled());
        assert!(!PipelineError::configuration("bad").is_cancelled());
    }
}
