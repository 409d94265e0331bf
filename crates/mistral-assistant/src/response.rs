//! JSON error responses shared by the API handlers.

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

pub type ErrorResponse = (StatusCode, Json<ErrorBody>);

fn error(status: StatusCode, code: &'static str, message: impl Into<String>) -> ErrorResponse {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }),
    )
}

pub fn not_found(message: impl Into<String>) -> ErrorResponse {
    error(StatusCode::NOT_FOUND, "not_found", message)
}

pub fn unprocessable(message: impl Into<String>) -> ErrorResponse {
    error(StatusCode::UNPROCESSABLE_ENTITY, "invalid_input", message)
}
