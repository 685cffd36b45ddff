use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Signature does not match wallet address")]
    SignatureMismatch,

    #[error("User already exists")]
    UserExists,

    #[error("Todo not found")]
    TodoNotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid credentials"),
            AppError::SignatureMismatch => (
                StatusCode::UNAUTHORIZED,
                "Signature does not match wallet address",
            ),
            AppError::UserExists => (StatusCode::BAD_REQUEST, "User already exists"),
            AppError::TodoNotFound => (StatusCode::NOT_FOUND, "Todo not found"),
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.as_str()),
            AppError::Database(err) => {
                tracing::error!("database error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            AppError::Internal(err) => {
                tracing::error!("internal error: {err}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
