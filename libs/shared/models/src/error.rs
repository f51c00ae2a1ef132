use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A business-rule refusal with a stable reason code.
    #[error("Rejected ({code}): {message}")]
    Rejected {
        code: String,
        message: String,
        details: Map<String, Value>,
    },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Rejected { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match self {
            AppError::Rejected { code, message, details } => {
                tracing::warn!("Rejected: {}: {}", code, message);

                let mut body = details;
                body.insert("error".to_string(), json!(message));
                body.insert("code".to_string(), json!(code));
                Value::Object(body)
            }
            AppError::NotFound(message)
            | AppError::Database(message)
            | AppError::ValidationError(message)
            | AppError::Conflict(message) => {
                tracing::error!("Error: {}: {}", status, message);
                json!({ "error": message })
            }
        };

        (status, Json(body)).into_response()
    }
}
