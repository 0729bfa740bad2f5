//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the central error type for the HTTP surface. Each
//! variant maps to a specific HTTP status code and structured JSON error
//! response. The collaborator errors ([`DirectoryError`],
//! [`MailWatchError`]) convert into it.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::SessionId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "device not found: W1AW",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failures reported by a [`crate::directory::DeviceDirectory`] backend.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The backing store rejected or failed the query.
    #[error("directory backend error: {0}")]
    Backend(String),

    /// The seed file could not be read or parsed.
    #[error("invalid directory seed: {0}")]
    Seed(String),
}

impl From<sqlx::Error> for DirectoryError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DirectoryError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Failures reported by the mail-watch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MailWatchError {
    /// The address cannot be watched.
    #[error("invalid mailbox address: {0}")]
    InvalidMailbox(String),

    /// The push payload could not be decoded.
    #[error("malformed push notification: {0}")]
    MalformedPush(String),
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status               |
/// |-----------|-----------------|---------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request           |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409       |
/// | 3000–3999 | Server          | 500 / 502                 |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No device with the given callsign exists in the directory.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// A session with the same id is already registered.
    #[error("session already registered: {0}")]
    DuplicateSession(SessionId),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Device directory failure.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Mail-watch collaborator rejected the operation.
    #[error(transparent)]
    MailWatch(#[from] MailWatchError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::MailWatch(MailWatchError::MalformedPush(_)) => 1002,
            Self::MailWatch(MailWatchError::InvalidMailbox(_)) => 1003,
            Self::DeviceNotFound(_) => 2001,
            Self::DuplicateSession(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Directory(_) => 3001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::MailWatch(_) => StatusCode::BAD_REQUEST,
            Self::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateSession(_) => StatusCode::CONFLICT,
            Self::Directory(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
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
