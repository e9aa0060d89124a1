//! Relay error types with HTTP status code mapping.
//!
//! [`RelayError`] is the central error type for both relay roles. Variants
//! fall into the categories the relay distinguishes at runtime:
//! configuration, handshake, per-connection I/O, protocol violations and
//! queue shutdown. Only configuration errors are fatal at startup; the rest
//! are scoped to a single connection.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// Returned instead of completing a WebSocket upgrade:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unauthorized: missing or mismatched api key"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
}

/// Relay error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category             | HTTP Status               |
/// |-----------|----------------------|---------------------------|
/// | 1000–1999 | Configuration        | 500 Internal Server Error |
/// | 2000–2999 | Handshake            | 401 / 502 / 504           |
/// | 3000–3999 | Connection I/O       | 500 Internal Server Error |
/// | 4000–4999 | Protocol / queues    | 400 / 503                 |
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// A shared secret is required in this mode but none is configured.
    #[error("api key is required {0}")]
    MissingApiKey(&'static str),

    /// The configured secret cannot be carried in a header.
    #[error("invalid api key: {0}")]
    InvalidApiKey(String),

    /// A bind or connect address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An environment setting has an unusable value.
    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    /// Client mode was selected without a server URL.
    #[error("RELAY_CONNECT is required in client mode")]
    MissingConnectUrl,

    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The peer presented no secret or the wrong one.
    #[error("unauthorized: missing or mismatched api key")]
    Unauthorized,

    /// Dialing the upstream server failed.
    #[error("failed to dial {url}: {reason}")]
    Dial {
        /// URL that was dialed.
        url: String,
        /// Transport or handshake failure.
        reason: String,
    },

    /// The server's handshake response did not echo our secret.
    #[error("server did not provide a valid api key")]
    ImposterServer,

    /// An operation exceeded its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Reading from a connection failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing to a connection failed.
    #[error("write failed: {0}")]
    Write(String),

    /// The upstream server closed the connection.
    #[error("upstream closed the connection")]
    UpstreamClosed,

    /// The peer sent a frame kind the relay does not accept.
    #[error("protocol violation: unexpected {0} frame")]
    ProtocolViolation(&'static str),

    /// The consumer side of a shared queue has gone away.
    #[error("{0} queue is closed")]
    QueueClosed(&'static str),
}

impl RelayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::MissingApiKey(_) => 1001,
            Self::InvalidApiKey(_) => 1002,
            Self::InvalidAddress(_) => 1003,
            Self::MissingConnectUrl => 1004,
            Self::Bind { .. } => 1005,
            Self::InvalidSetting(_) => 1006,
            Self::Unauthorized => 2001,
            Self::Dial { .. } => 2002,
            Self::ImposterServer => 2003,
            Self::Timeout(_) => 2004,
            Self::Read(_) => 3001,
            Self::Write(_) => 3002,
            Self::UpstreamClosed => 3003,
            Self::ProtocolViolation(_) => 4001,
            Self::QueueClosed(_) => 4002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Dial { .. } | Self::ImposterServer => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::ProtocolViolation(_) => StatusCode::BAD_REQUEST,
            Self::QueueClosed(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::MissingApiKey(_)
            | Self::InvalidApiKey(_)
            | Self::InvalidAddress(_)
            | Self::InvalidSetting(_)
            | Self::MissingConnectUrl
            | Self::Bind { .. }
            | Self::Read(_)
            | Self::Write(_)
            | Self::UpstreamClosed => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns `true` for errors that must abort startup rather than a
    /// single connection.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        self.error_code() < 2000
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
