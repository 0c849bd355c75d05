use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict ({code}): {message}")]
    Conflict {
        code: &'static str,
        message: String,
        conflicts: Vec<String>,
        requires_reschedule: bool,
    },

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
            conflicts: Vec::new(),
            requires_reschedule: false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) | AppError::InvalidState(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::Internal(_) | AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code returned alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Auth(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::ValidationError(_) => "validation_error",
            AppError::InvalidState(_) => "invalid_state",
            AppError::Conflict { code, .. } => code,
            AppError::Internal(_) | AppError::Database(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let body = match &self {
            // Storage and internal failures never leave the process verbatim.
            AppError::Internal(detail) | AppError::Database(detail) => {
                tracing::error!(code, "Error: {}: {}", status, detail);
                json!({
                    "error": "An internal error occurred",
                    "code": code,
                })
            }
            AppError::Conflict { message, conflicts, requires_reschedule, .. } => {
                tracing::warn!(code, "Error: {}: {}", status, message);
                let mut body = json!({
                    "error": message,
                    "code": code,
                });
                if !conflicts.is_empty() || *requires_reschedule {
                    body["conflicts"] = json!(conflicts);
                    body["requiresReschedule"] = json!(requires_reschedule);
                }
                body
            }
            AppError::Auth(message)
            | AppError::Forbidden(message)
            | AppError::NotFound(message)
            | AppError::ValidationError(message)
            | AppError::InvalidState(message) => {
                tracing::warn!(code, "Error: {}: {}", status, message);
                json!({
                    "error": message,
                    "code": code,
                })
            }
        };

        (status, Json(body)).into_response()
    }
}
