use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use super::response::Response;
use crate::error::TransportError;

/// What a completed `execute` call hands back.
///
/// Payloads are reference-counted: every caller that shared a deduplicated
/// call receives clones of the same `Arc`s.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The transport answered successfully during this call.
    Fresh(Arc<Response>),
    /// Every attempt failed; this is the last response recorded for the
    /// signature, together with the error that ended the attempt sequence.
    Stale {
        response: Arc<Response>,
        error: Arc<TransportError>,
        stored_at: DateTime<Utc>,
    },
    /// Every attempt failed and nothing was cached.
    Failed(Arc<TransportError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Fresh,
    Stale,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Fresh => write!(f, "fresh"),
            OutcomeKind::Stale => write!(f, "stale"),
            OutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Fresh(_) => OutcomeKind::Fresh,
            Outcome::Stale { .. } => OutcomeKind::Stale,
            Outcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Outcome::Fresh(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Outcome::Stale { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// True when the response was served from the stale cache.
    pub fn from_cache(&self) -> bool {
        self.is_stale()
    }

    pub fn response(&self) -> Option<&Arc<Response>> {
        match self {
            Outcome::Fresh(response) | Outcome::Stale { response, .. } => Some(response),
            Outcome::Failed(_) => None,
        }
    }

    /// The error behind a `Stale` or `Failed` outcome.
    pub fn error(&self) -> Option<&Arc<TransportError>> {
        match self {
            Outcome::Fresh(_) => None,
            Outcome::Stale { error, .. } | Outcome::Failed(error) => Some(error),
        }
    }

    /// Collapse into a plain result, accepting stale data as success.
    pub fn into_result(self) -> Result<Arc<Response>, Arc<TransportError>> {
        match self {
            Outcome::Fresh(response) | Outcome::Stale { response, .. } => Ok(response),
            Outcome::Failed(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_outcome_accessors() {
        let response = Arc::new(Response::ok("cached"));
        let error = Arc::new(TransportError::status(500, "boom"));
        let outcome = Outcome::Stale {
            response: Arc::clone(&response),
            error: Arc::clone(&error),
            stored_at: Utc::now(),
        };

        assert_eq!(outcome.kind(), OutcomeKind::Stale);
        assert!(outcome.from_cache());
        assert!(Arc::ptr_eq(outcome.response().unwrap(), &response));
        assert!(Arc::ptr_eq(outcome.error().unwrap(), &error));
        assert!(outcome.into_result().is_ok());
    }

    #[test]
    fn test_failed_outcome_has_no_response() {
        let outcome = Outcome::Failed(Arc::new(TransportError::timeout("slow")));
        assert!(outcome.is_failed());
        assert!(outcome.response().is_none());
        assert_eq!(outcome.kind().to_string(), "failed");
        assert!(outcome.into_result().is_err());
    }
}
