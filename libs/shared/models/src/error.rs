use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Conflict carrying a structured payload (overlapping intervals, alternatives).
    #[error("Conflict: {message}")]
    ConflictWithDetails { message: String, details: Value },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) | AppError::ConflictWithDetails { .. } => StatusCode::CONFLICT,
            AppError::InvalidStateTransition(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::ConflictWithDetails { message, details } => {
                tracing::error!("Error: {}: {}", status, message);
                json!({
                    "error": message,
                    "details": details
                })
            }
            AppError::Auth(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::BadRequest(message)
            | AppError::Internal(message)
            | AppError::ValidationError(message)
            | AppError::Conflict(message)
            | AppError::InvalidStateTransition(message) => {
                tracing::error!("Error: {}: {}", status, message);
                json!({
                    "error": message
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
