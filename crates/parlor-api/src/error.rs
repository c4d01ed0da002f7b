use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use parlor_db::AuthError;
use parlor_types::api::ErrorResponse;

/// Failure of an HTTP request, rendered as `{"success": false, "error": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid username or password")]
    Unauthorized,

    #[error("Server is shutting down")]
    Unavailable,

    #[error("{0}")]
    Internal(&'static str),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::NotFound | AuthError::Unauthenticated => Self::Unauthorized,
            AuthError::InvalidInput | AuthError::AlreadyExists => Self::BadRequest(e.to_string()),
            AuthError::Persistence(_) | AuthError::Hash(_) => {
                error!("Credential check failed: {}", e);
                Self::Internal("Authentication failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
