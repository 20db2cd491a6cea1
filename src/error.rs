//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the gateway. Each variant
//! maps to a numeric code and, for the REST surface, an HTTP status.
//! WebSocket clients only ever see the display message, delivered as an
//! `error` event to the originating connection.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::ConnectionId;

/// Structured JSON error response body.
///
/// All REST error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 1001,
///     "message": "invalid identity: name is empty",
///     "details": null
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
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum.
///
/// # Error Code Ranges
///
/// | Range     | Category         | HTTP Status               |
/// |-----------|------------------|---------------------------|
/// | 1000–1999 | Validation       | 400 Bad Request           |
/// | 2000–2999 | State/Not Found  | 404 Not Found             |
/// | 4000–4999 | Session-Specific | 422 Unprocessable Entity  |
///
/// No variant is ever fatal: every error is recovered locally and at most
/// reported back to the connection that caused it.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Identity rejected: blank name, or the connection already identified.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// Room operation rejected: blank room name or non-membership.
    #[error("invalid room: {0}")]
    InvalidRoom(String),

    /// A message arrived from a connection that has not identified yet.
    #[error("unidentified sender: identify with a join event first")]
    UnidentifiedSender,

    /// No live connection with the given ID exists.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidIdentity(_) => 1001,
            Self::InvalidRoom(_) => 1002,
            Self::UnidentifiedSender => 4001,
            Self::ConnectionNotFound(_) => 2001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidIdentity(_) | Self::InvalidRoom(_) => StatusCode::BAD_REQUEST,
            Self::UnidentifiedSender => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
