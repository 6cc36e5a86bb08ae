//! Survey engine error types with HTTP status code mapping.
//!
//! [`SurveyError`] covers failures that abort the current call. Outcomes the
//! survey lifecycle treats as normal (no pending survey, unrecognized reply,
//! ineligible event, unresolved organizer) are reported through outcome enums
//! in [`crate::service`] instead.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::EventId;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "event not found: 42",
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

/// Engine error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category          | HTTP Status                 |
/// |-----------|-------------------|-----------------------------|
/// | 1000–1999 | Validation        | 400 Bad Request             |
/// | 2000–2999 | Not Found         | 404 Not Found               |
/// | 3000–3999 | Server / upstream | 500 / 502 / 504 / 409       |
#[derive(Debug, thiserror::Error)]
pub enum SurveyError {
    /// Event with the given ID does not exist.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// No directory user matches the given identity or email.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Calendar source failure.
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Notification channel failure.
    #[error("notification error: {0}")]
    Notification(String),

    /// An external call did not finish within its bound.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout {
        /// Name of the external operation.
        operation: &'static str,
        /// Elapsed bound in milliseconds.
        after_ms: u64,
    },

    /// The stage claim on an event expired and another worker took it.
    #[error("claim on event {0} was lost")]
    ClaimLost(EventId),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SurveyError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::EventNotFound(_) => 2001,
            Self::UserNotFound(_) => 2002,
            Self::Internal(_) => 3000,
            Self::Persistence(_) => 3001,
            Self::Calendar(_) => 3002,
            Self::Notification(_) => 3003,
            Self::Timeout { .. } => 3004,
            Self::Config(_) => 3005,
            Self::ClaimLost(_) => 3006,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::EventNotFound(_) | Self::UserNotFound(_) => StatusCode::NOT_FOUND,
            Self::Calendar(_) | Self::Notification(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Self::ClaimLost(_) => StatusCode::CONFLICT,
            Self::Persistence(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for SurveyError {
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
