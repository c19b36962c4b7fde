// ── Core error types ──
//
// `ErrorKind` is the closed taxonomy every failed operation resolves to;
// callers branch on it instead of on HTTP codes or transport details.
// `CoreError` covers failures that are not operation outcomes: boundary
// validation, authentication of ingress requests, and hub lookups.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

/// Closed set of failure kinds an operation can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Transport failed before a response was obtained.
    NetworkError,
    /// Caller-specified deadline elapsed.
    Timeout,
    /// Malformed request.
    ValidationError,
    /// Unauthenticated or unauthorized.
    PermissionError,
    /// Write conflict at the remote store.
    DataConflict,
    /// Throttled by the remote store.
    RateLimit,
    /// Remote-side fault.
    ServerError,
}

impl ErrorKind {
    /// Whether an outcome of this kind may succeed on a later attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::Timeout | Self::RateLimit | Self::ServerError
        )
    }

    /// Outcome code reported when the remote gave none.
    pub fn default_status(self) -> u16 {
        match self {
            Self::NetworkError => 503,
            Self::Timeout => 504,
            Self::ValidationError => 400,
            Self::PermissionError => 403,
            Self::DataConflict => 409,
            Self::RateLimit => 429,
            Self::ServerError => 500,
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Boundary validation ──────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    // ── Ingress authentication ───────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Sync hub ─────────────────────────────────────────────────────
    #[error("Connection not found: {id}")]
    ConnectionNotFound { id: String },

    #[error("Connection {id} is closed")]
    ConnectionClosed { id: String },

    // ── Remote store (wrapped, not exposed raw) ──────────────────────
    #[error("Remote store error ({kind}): {message}")]
    Remote { kind: ErrorKind, message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The taxonomy kind this error maps to when reported as an
    /// operation outcome.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::ValidationError,
            Self::Authentication { .. } => ErrorKind::PermissionError,
            Self::Remote { kind, .. } => *kind,
            Self::ConnectionNotFound { .. }
            | Self::ConnectionClosed { .. }
            | Self::Internal(_) => ErrorKind::ServerError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::NetworkError.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(ErrorKind::ServerError.is_retryable());
        assert!(!ErrorKind::ValidationError.is_retryable());
        assert!(!ErrorKind::PermissionError.is_retryable());
        assert!(!ErrorKind::DataConflict.is_retryable());
    }

    #[test]
    fn kinds_render_in_screaming_snake_case() {
        assert_eq!(ErrorKind::DataConflict.to_string(), "DATA_CONFLICT");
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimit).ok().as_deref(),
            Some("\"RATE_LIMIT\"")
        );
    }

    #[test]
    fn validation_errors_classify_as_validation() {
        let err = CoreError::validation("id", "required for get");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(err.to_string(), "Invalid id: required for get");
    }
}
