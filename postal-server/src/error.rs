//! Error types for the postal HTTP layer.
//!
//! [`ApiError`] covers everything a `/parse` request can fail with and maps
//! each case to a status code and a fixed plain-text message.
//! [`ServerError`] covers listener setup, which is fatal for the binary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use postal_core::ParseError;
use thiserror::Error;
use tracing::{error, warn};

/// Per-request failures of the parse endpoint.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Body could not be read (client abort, truncation, size limit).
    #[error("Failed to read the request.")]
    Transport(#[source] axum::Error),

    /// Body is not a JSON object with string fields.
    #[error("Failed to extract the request.")]
    Malformed(#[source] serde_json::Error),

    /// `addr` missing, null, or empty.
    #[error("An address must exist in the request.")]
    Validation,

    /// The parser rejected the input or is unavailable.
    #[error("Parse failed: {0}")]
    Parse(ParseError),

    /// The parser did not answer within the request deadline.
    #[error("Parse failed: {0}")]
    Timeout(ParseError),

    /// Components could not be serialized.
    #[error("Failed to encode the response.")]
    Internal(#[source] serde_json::Error),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Transport(_) | Self::Malformed(_) | Self::Validation | Self::Parse(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short tag used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Malformed(_) => "malformed",
            Self::Validation => "validation",
            Self::Parse(_) => "parse",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<ParseError> for ApiError {
    fn from(err: ParseError) -> Self {
        if err.is_timeout() {
            Self::Timeout(err)
        } else {
            Self::Parse(err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let cause = std::error::Error::source(&self).map(ToString::to_string);

        if status.is_server_error() {
            error!(
                kind = self.kind(),
                status = status.as_u16(),
                cause = ?cause,
                error = %self,
                "Parse request failed"
            );
        } else {
            warn!(
                kind = self.kind(),
                status = status.as_u16(),
                cause = ?cause,
                error = %self,
                "Parse request rejected"
            );
        }

        (status, self.to_string()).into_response()
    }
}

/// Listener setup and serving failures.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listen address could not be bound (in use, permission, bad host).
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
