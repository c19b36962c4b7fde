use thiserror::Error;

/// Top-level error type for the `syncdesk-api` crate.
///
/// Covers every failure mode of a single round trip to the remote
/// record store. `syncdesk-core` classifies these into the closed
/// error taxonomy the executor reports to callers.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The caller-side deadline elapsed before a response arrived.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Remote outcomes ─────────────────────────────────────────────
    /// Throttled by the remote store. Includes `Retry-After` when sent.
    #[error("Rate limited by remote store")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Non-success HTTP status.
    #[error("Remote store returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// A well-formed response carrying an application-level `ok: false`.
    #[error("Remote store rejected the request: {message}")]
    Envelope { status: Option<u16>, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Server-provided backoff hint, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}
