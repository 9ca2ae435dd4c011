//! HTTP mapping of the crate error type.
//!
//! Validation and business-rule errors reach the caller with their message. Security,
//! external and persistence errors are logged in full and answered generically, so a
//! failing callback or query never tells the caller why.

use crate::errors::{Error, ErrorKind};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Error returned by handlers.
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    success: bool,
    code: &'static str,
    message: String,
}

impl AppError {
    /// Status code, machine-readable code, and caller-facing message.
    fn parts(&self) -> (StatusCode, &'static str, String) {
        let err = &self.0;
        match err.kind() {
            ErrorKind::Validation => match err {
                Error::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
                _ => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", err.to_string()),
            },
            ErrorKind::Security => (
                StatusCode::BAD_REQUEST,
                "SECURITY_ERROR",
                "The request could not be verified".to_string(),
            ),
            ErrorKind::BusinessRule => match err {
                Error::Conflict { .. }
                | Error::IllegalTransition { .. }
                | Error::CapacityExhausted { .. } => (StatusCode::CONFLICT, "CONFLICT", err.to_string()),
                Error::NoActiveGateway => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NO_ACTIVE_GATEWAY",
                    err.to_string(),
                ),
                _ => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "BUSINESS_RULE",
                    err.to_string(),
                ),
            },
            ErrorKind::External => (
                StatusCode::BAD_GATEWAY,
                "GATEWAY_UNAVAILABLE",
                "The payment provider is unavailable, please try again".to_string(),
            ),
            ErrorKind::Persistence => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_SERVER_ERROR",
                "An internal error occurred".to_string(),
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();

        match self.0.kind() {
            ErrorKind::Security => tracing::warn!(error = %self.0, "Rejected unverifiable request"),
            ErrorKind::External | ErrorKind::Persistence => {
                tracing::error!(status = %status, error = %self.0, "Internal server error");
            }
            ErrorKind::Validation | ErrorKind::BusinessRule => {
                tracing::debug!(status = %status, error = %self.0, "Request refused");
            }
        }

        let body = ErrorResponse {
            success: false,
            code,
            message,
        };
        (status, Json(body)).into_response()
    }
}
