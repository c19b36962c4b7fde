// ── Error classification ──
//
// Maps every transport / HTTP outcome from `syncdesk-api` onto the closed
// `ErrorKind` taxonomy plus a retry verdict. The executor never inspects
// raw errors itself; this module is the single place that decides what
// is worth another attempt.

use std::time::Duration;

use syncdesk_api::Error as ApiError;

use crate::error::ErrorKind;

/// Verdict for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: ErrorKind,
    /// Outcome code reported to the caller.
    pub status: u16,
    pub message: String,
    pub retryable: bool,
    /// Server-provided minimum wait before the next attempt.
    pub retry_after: Option<Duration>,
}

/// Classify an outcome code alone.
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::PermissionError,
        409 | 412 => ErrorKind::DataConflict,
        429 => ErrorKind::RateLimit,
        500..=599 => ErrorKind::ServerError,
        // Any other 4xx (and anything outside the error ranges reaching
        // this point) is a request the store refused as malformed.
        _ => ErrorKind::ValidationError,
    }
}

/// Classify a failed remote call.
pub fn classify(err: &ApiError) -> Classification {
    let (kind, status) = match err {
        ApiError::Transport(e) if e.is_timeout() => (ErrorKind::Timeout, None),
        ApiError::Transport(e) => match e.status() {
            Some(s) => (kind_for_status(s.as_u16()), Some(s.as_u16())),
            None => (ErrorKind::NetworkError, None),
        },
        ApiError::Timeout { .. } => (ErrorKind::Timeout, None),
        ApiError::InvalidUrl(_) => (ErrorKind::ValidationError, None),
        ApiError::Tls(_) => (ErrorKind::NetworkError, None),
        ApiError::RateLimited { .. } => (ErrorKind::RateLimit, Some(429)),
        ApiError::Status { status, .. } => (kind_for_status(*status), Some(*status)),
        // Application-level `ok:false`: server fault unless the embedded
        // code names something more specific.
        ApiError::Envelope { status, .. } => match status {
            Some(s) if (400..600).contains(s) => (kind_for_status(*s), Some(*s)),
            _ => (ErrorKind::ServerError, None),
        },
        // A success status with an unreadable body: bad gateway.
        ApiError::Deserialization { .. } => (ErrorKind::ServerError, Some(502)),
    };

    Classification {
        kind,
        status: status.unwrap_or_else(|| kind.default_status()),
        message: err.to_string(),
        retryable: kind.is_retryable(),
        retry_after: err.retry_after_secs().map(Duration::from_secs),
    }
}
