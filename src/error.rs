//! Error taxonomy for the request router.
//!
//! Validation failures map to HTTP 400, everything else to 500. Probe and
//! audit-sink errors never reach callers: the prober treats any failure as
//! "unavailable" and sink failures are swallowed with a warning.

use thiserror::Error;

/// Top-level error returned by the orchestrator.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The prompt was empty after trimming.
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    /// The prompt contained a restricted term.
    #[error("Prompt contains restricted content: {term}")]
    RestrictedContent { term: String },

    /// All permitted backend attempts failed. Carries the last failure.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RouterError {
    /// HTTP status code a serving layer should attach to this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::EmptyPrompt | Self::RestrictedContent { .. } => 400,
            Self::Backend(_) => 500,
        }
    }

    /// Whether this request was rejected before any backend was invoked.
    pub fn is_rejection(&self) -> bool {
        self.status_code() == 400
    }
}

/// A chat-completion backend failed to produce a response.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Non-2xx HTTP status; `message` is the error body's message field
    /// when one could be extracted, otherwise the raw body.
    #[error("{backend} backend returned HTTP {status}: {message}")]
    Status {
        backend: String,
        status: u16,
        message: String,
    },

    /// Transport-level failure (connect, timeout, TLS).
    #[error("{backend} backend request failed: {source}")]
    Transport {
        backend: String,
        #[source]
        source: reqwest::Error,
    },

    /// 2xx response whose body did not match the expected shape.
    #[error("{backend} backend returned an unexpected response: {detail}")]
    Malformed { backend: String, detail: String },
}

impl BackendError {
    /// Identifier of the backend that produced this error.
    pub fn backend(&self) -> &str {
        match self {
            Self::Status { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Malformed { backend, .. } => backend,
        }
    }
}

/// Availability-probe failure. Never surfaced to callers; it only means the
/// local backend is treated as unreachable for the cached probe window.
#[derive(Debug, Error)]
#[error("availability probe failed: {reason}")]
pub struct ProbeError {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400() {
        assert_eq!(RouterError::EmptyPrompt.status_code(), 400);
        assert_eq!(
            RouterError::RestrictedContent { term: "ssn".into() }.status_code(),
            400
        );
        assert!(RouterError::EmptyPrompt.is_rejection());
    }

    #[test]
    fn backend_errors_map_to_500() {
        let err = RouterError::Backend(BackendError::Malformed {
            backend: "cloud".into(),
            detail: "missing choices".into(),
        });
        assert_eq!(err.status_code(), 500);
        assert!(!err.is_rejection());
    }

    #[test]
    fn backend_error_names_its_backend() {
        let err = BackendError::Status {
            backend: "local".into(),
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.backend(), "local");
        assert!(err.to_string().contains("503"));
    }
}
