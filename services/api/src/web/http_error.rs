//! services/api/src/web/http_error.rs
//!
//! Translates domain errors into HTTP status codes and `{ "error": message }` bodies.

use crate::web::protocol::ErrorResponse;
use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use recording_core::{PortError, SessionError, ValidationError};
use std::any::Any;
use tracing::{error, warn};

/// The error type returned by every REST handler.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Logs the cause server-side; the client still sees the message.
    pub fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("Internal error: {}", message);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse { error: self.message })).into_response()
    }
}

impl From<PortError> for HttpError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::NotFound(message) => Self::not_found(message),
            PortError::Conflict(message) => Self::conflict(message),
            PortError::Unexpected(message) => Self::internal(message),
        }
    }
}

impl From<ValidationError> for HttpError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<SessionError> for HttpError {
    fn from(e: SessionError) -> Self {
        let message = e.to_string();
        match e {
            SessionError::Validation(_) => Self::bad_request(message),
            SessionError::Conflict(_) => Self::conflict(message),
            SessionError::NotFound(_) => Self::not_found(message),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!(
            "Invalid request body. Make sure durations are non-negative integers. ({})",
            rejection.body_text()
        ))
    }
}

/// A path segment that does not parse (`/video/abc`) names no resource.
impl From<PathRejection> for HttpError {
    fn from(rejection: PathRejection) -> Self {
        warn!("Rejected request path: {}", rejection.body_text());
        Self::not_found("Not found")
    }
}

/// Fallback for requests that match no route.
pub async fn route_not_found() -> HttpError {
    HttpError::not_found("Not found")
}

/// Turns a panicking handler into a JSON 500 instead of a dropped connection.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!("Request handler panicked: {}", detail);
    HttpError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}

/// Trims `username` and rejects it when missing or blank.
pub fn required_username(username: Option<String>) -> Result<String, HttpError> {
    let username = username.unwrap_or_default().trim().to_string();
    if username.is_empty() {
        return Err(HttpError::bad_request("username is required"));
    }
    Ok(username)
}
