//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::domain::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Ledger errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => {
                AppError::Unauthorized("Invalid username or password".to_string())
            }
            AuthError::Token(e) => AppError::Unauthorized(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                self.to_string(),
                Some(msg.clone()),
            ),

            // 401 Unauthorized
            AppError::Unauthorized(_) => {
                (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string(), None)
            }

            // 404 Not Found
            AppError::NotFound(path) => (
                StatusCode::NOT_FOUND,
                "not_found",
                self.to_string(),
                Some(path.clone()),
            ),

            // Ledger errors map by kind
            AppError::Ledger(ledger_err) => match ledger_err {
                LedgerError::NotFound { .. } => (
                    StatusCode::NOT_FOUND,
                    ledger_err.code(),
                    ledger_err.to_string(),
                    None,
                ),
                LedgerError::Internal(detail) => {
                    tracing::error!("Ledger internal error: {}", detail);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ledger_err.code(),
                        INTERNAL_MESSAGE.to_string(),
                        None,
                    )
                }
                _ => (
                    StatusCode::BAD_REQUEST,
                    ledger_err.code(),
                    ledger_err.to_string(),
                    None,
                ),
            },

            // 500 Internal Server Error
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    INTERNAL_MESSAGE.to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
