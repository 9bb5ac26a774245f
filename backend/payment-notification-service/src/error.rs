/// Error types for payment-notification-service
///
/// Durable-store failures propagate as `Storage`; realtime failures surface as
/// `NotInitialized` and are absorbed by the dispatcher.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Result type for service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Missing or malformed client input
    #[error("validation error: {0}")]
    Validation(String),

    /// Realtime gateway accessed before the connection layer started
    #[error("realtime gateway not initialized")]
    NotInitialized,

    /// Durable write or read failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Gateway callback signature or parameters did not verify
    #[error("gateway verification failed for order {order_id}")]
    GatewayVerification { order_id: i64 },

    /// Transaction reference does not map to a known order
    #[error("unresolved order reference: {0}")]
    UnresolvedOrder(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    status: u16,
}

impl AppError {
    /// Short machine-readable kind used in error bodies and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::NotInitialized => "not_initialized",
            AppError::Storage(_) => "storage_error",
            AppError::GatewayVerification { .. } => "gateway_verification_error",
            AppError::UnresolvedOrder(_) => "unresolved_order",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Config(_) => "config_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::UnresolvedOrder(_) => StatusCode::NOT_FOUND,
            AppError::GatewayVerification { .. } => StatusCode::BAD_REQUEST,
            AppError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) | AppError::Config(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        // Storage and internal details stay in the logs.
        let message = match self {
            AppError::Storage(_) | AppError::Internal(_) | AppError::Config(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(ErrorBody {
            error: self.kind(),
            message,
            status: status.as_u16(),
        })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Storage(err.to_string())
    }
}
