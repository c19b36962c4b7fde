use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use syncdesk_config::ConfigError;
use syncdesk_core::CoreError;

/// Startup and lifecycle failures of the server process.
#[derive(Debug, Error, Diagnostic)]
pub enum ServerError {
    #[error(transparent)]
    #[diagnostic(
        code(syncdesk::config),
        help("run `syncdesk check-config` to see which value is rejected")
    )]
    Config(#[from] ConfigError),

    #[error("could not build the remote store client: {0}")]
    #[diagnostic(
        code(syncdesk::remote),
        help("check remote.ca_cert and remote.base_url in your config")
    )]
    Remote(#[from] syncdesk_api::Error),

    #[error("could not bind {addr}")]
    #[diagnostic(
        code(syncdesk::bind),
        help("another process may already be listening; change server.bind")
    )]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid CORS origin '{origin}'")]
    #[diagnostic(code(syncdesk::cors))]
    CorsOrigin { origin: String },

    #[error("server I/O failed: {0}")]
    #[diagnostic(code(syncdesk::io))]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::CorsOrigin { .. } => exit_code::CONFIG,
            Self::Remote(_) => exit_code::REMOTE,
            Self::Bind { .. } | Self::Io(_) => exit_code::IO,
        }
    }
}

pub mod exit_code {
    pub const CONFIG: i32 = 2;
    pub const REMOTE: i32 = 3;
    pub const IO: i32 = 4;
}

// ── HTTP error responses ────────────────────────────────────────────

/// Error returned by route handlers, rendered as
/// `{"ok": false, "error": ..., "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or unrecognised bearer token")]
    Unauthorized,

    #[error("malformed request body: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Core(err) => match err {
                CoreError::Validation { .. } => StatusCode::BAD_REQUEST,
                CoreError::Authentication { .. } => StatusCode::UNAUTHORIZED,
                CoreError::ConnectionNotFound { .. } => StatusCode::NOT_FOUND,
                CoreError::ConnectionClosed { .. } => StatusCode::GONE,
                CoreError::Remote { .. } => StatusCode::BAD_GATEWAY,
                CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadRequest(_) => "bad_request",
            Self::Core(err) => match err {
                CoreError::Validation { .. } => "validation",
                CoreError::Authentication { .. } => "unauthorized",
                CoreError::ConnectionNotFound { .. } => "connection_not_found",
                CoreError::ConnectionClosed { .. } => "connection_closed",
                CoreError::Remote { .. } => "remote",
                CoreError::Internal(_) => "internal",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = json!({
            "ok": false,
            "error": self.code(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_http_statuses() {
        let cases = [
            (CoreError::validation("table", "required"), StatusCode::BAD_REQUEST),
            (
                CoreError::Authentication { message: "no user".into() },
                StatusCode::UNAUTHORIZED,
            ),
            (CoreError::ConnectionNotFound { id: "c1".into() }, StatusCode::NOT_FOUND),
            (CoreError::ConnectionClosed { id: "c1".into() }, StatusCode::GONE),
            (CoreError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn startup_errors_carry_exit_codes() {
        let err = ServerError::CorsOrigin { origin: "\n".into() };
        assert_eq!(err.exit_code(), exit_code::CONFIG);
    }
}
