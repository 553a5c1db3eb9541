//! Uniform JSON envelope shared by every public HTTP endpoint.
//!
//! ```json
//! {"status": "success", "message": "user logged in successfully", "data": {...}}
//! {"status": "error", "message": "invalid or expired token"}
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: Outcome,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

/// A successful response: status code plus enveloped payload.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status_code: StatusCode,
    envelope: Envelope<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    fn with_status(status_code: StatusCode, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            status_code,
            envelope: Envelope {
                status: Outcome::Success,
                message: message.into(),
                data: Some(data),
            },
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.envelope)).into_response()
    }
}

/// Builds a failure envelope. Used by the `IntoResponse` impls of the
/// service error types.
pub fn error_response(status_code: StatusCode, message: impl Into<String>) -> Response {
    let body = Envelope::<()> {
        status: Outcome::Error,
        message: message.into(),
        data: None,
    };
    (status_code, Json(body)).into_response()
}
