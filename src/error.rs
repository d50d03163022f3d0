use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("Device unreachable: {0}")]
    DeviceUnreachable(String),

    #[error("Device command failed: {0}")]
    CommandFailed(String),

    /// The payment record was already used to extend a subscription.
    #[error("Payment {0} has already been consumed")]
    AlreadyConsumed(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DeviceUnreachable(_) | AppError::CommandFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::AlreadyConsumed(_) => StatusCode::CONFLICT,
            AppError::Storage(_) | AppError::Pool(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Device-side failures never fail a billing operation; callers report them as pending.
    pub fn is_device_failure(&self) -> bool {
        matches!(self, AppError::DeviceUnreachable(_) | AppError::CommandFailed(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak storage details to clients
        let message = match &self {
            AppError::Storage(e) => {
                tracing::error!(error = %e, "Storage error");
                "Database error".to_string()
            }
            AppError::Pool(e) => {
                tracing::error!(error = %e, "Connection pool error");
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
