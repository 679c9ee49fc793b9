// Error handling module
// Defines error types and HTTP response conversion

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced at the HTTP edge
#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller or upstream authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// No access token could be obtained
    #[error("Access token unavailable: {0}")]
    TokenUnavailable(String),

    /// Error from the upstream API
    #[error("Upstream API error: {status} - {message}")]
    UpstreamError { status: u16, message: String },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "auth_error", msg),
            ApiError::TokenUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "token_unavailable", msg)
            }
            ApiError::UpstreamError { status, message } => {
                let status_code =
                    StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (status_code, "upstream_error", message)
            }
            ApiError::Internal(err) => {
                // Log internal errors
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        }));

        (status, body).into_response()
    }
}
