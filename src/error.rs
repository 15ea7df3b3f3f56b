use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::{ModerationRateLimitError, RateLimitError, ValidationError};

/// Errors surfaced by the HTTP handlers. Bodies never carry internal detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    /// Moderation variant of the 429; the body repeats a safe verdict
    #[error("moderation rate limit exceeded, retry after {retry_after}s")]
    ModerationRateLimited { retry_after: u64 },

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(details) => {
                (StatusCode::BAD_REQUEST, Json(json!(ValidationError::new(details)))).into_response()
            }
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!(RateLimitError::new(retry_after))),
            )
                .into_response(),
            ApiError::ModerationRateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!(ModerationRateLimitError::new(retry_after))),
            )
                .into_response(),
            ApiError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Invalid email or password" })),
            )
                .into_response(),
            ApiError::Rejected(reason) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
            }
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal server error" })),
            )
                .into_response(),
        }
    }
}

/// Generic 500 for the moderation route; callers keep publishing on failure
pub fn moderation_internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "safe": true })),
    )
        .into_response()
}
