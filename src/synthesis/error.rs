//! Error taxonomy for the synthesis side.
//!
//! Every failure is reduced to a [`SynthesisErrorKind`] so the retry executor
//! never has to know which transport (HTTP, local worker) produced it.

use thiserror::Error;

use crate::worker::WorkerError;

/// Transport-independent classification used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisErrorKind {
    /// A referenced entity is absent on the resource side. Terminal.
    NotFound,
    /// Network, timeout or temporary unavailability. Retryable.
    Transient,
    /// Anything retries cannot fix. Terminal.
    Other,
}

/// Errors raised while synthesizing one request.
#[derive(Debug, Clone, Error)]
pub enum SynthesisError {
    /// The resource does not know the referenced voice (HTTP 404 and friends).
    #[error("not found: {0}")]
    NotFound(String),

    /// Connection failure, timeout, 5xx, 408 or 429.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Permanently invalid request or undecodable response.
    #[error("synthesis failed: {0}")]
    Other(String),

    /// The serialized worker could not accept or serve the request.
    #[error("worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl SynthesisError {
    pub fn kind(&self) -> SynthesisErrorKind {
        match self {
            SynthesisError::NotFound(_) => SynthesisErrorKind::NotFound,
            SynthesisError::Transient(_) => SynthesisErrorKind::Transient,
            SynthesisError::Other(_) => SynthesisErrorKind::Other,
            SynthesisError::Worker(WorkerError::Busy { .. }) => SynthesisErrorKind::Transient,
            SynthesisError::Worker(WorkerError::ShutDown) => SynthesisErrorKind::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == SynthesisErrorKind::Transient
    }

    /// Classify a non-success HTTP status returned by a remote resource.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("HTTP {status}: {}", message.into());
        match status {
            404 => SynthesisError::NotFound(message),
            408 | 429 | 500..=599 => SynthesisError::Transient(message),
            _ => SynthesisError::Other(message),
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return SynthesisError::from_status(status.as_u16(), err.to_string());
        }
        if err.is_decode() || err.is_builder() {
            SynthesisError::Other(err.to_string())
        } else {
            SynthesisError::Transient(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            SynthesisError::from_status(404, "no voice").kind(),
            SynthesisErrorKind::NotFound
        );
        for status in [408, 429, 500, 502, 503, 504] {
            assert_eq!(
                SynthesisError::from_status(status, "x").kind(),
                SynthesisErrorKind::Transient,
                "{status}"
            );
        }
        for status in [400, 401, 403, 422] {
            assert_eq!(
                SynthesisError::from_status(status, "x").kind(),
                SynthesisErrorKind::Other,
                "{status}"
            );
        }
    }

    #[test]
    fn worker_errors_classify() {
        let busy = SynthesisError::from(WorkerError::Busy { capacity: 4 });
        assert!(busy.is_retryable());

        let down = SynthesisError::from(WorkerError::ShutDown);
        assert_eq!(down.kind(), SynthesisErrorKind::Other);
        assert!(!down.is_retryable());
    }

    #[test]
    fn display_includes_status() {
        let err = SynthesisError::from_status(503, "overloaded");
        assert_eq!(err.to_string(), "transient failure: HTTP 503: overloaded");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SynthesisError>();
    }
}
