use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tripod_core::error::{CoreError, ResourceError, ValidationError};
use tripod_worker::DispatchError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and [`DispatchError`] and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent JSON error
/// responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A pipeline error from `tripod_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A worker pool or tracker error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The addressed resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The resource exists but is not in a state that allows the request.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The upload exceeds the configured size.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        Self::Core(CoreError::Validation(err))
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        Self::Core(CoreError::Resource(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::Validation(err) => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    err.to_string(),
                ),
                CoreError::Aggregation(err) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "UNPROCESSABLE",
                    err.to_string(),
                ),
                CoreError::Resource(err) => {
                    tracing::error!(error = %err, "Workspace resource error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- DispatchError variants ---
            AppError::Dispatch(err) => match err {
                DispatchError::UnknownJob(_) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
                }
                DispatchError::DuplicateJob(_) => {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                }
                DispatchError::PoolClosed => (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    err.to_string(),
                ),
            },

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg.clone())
            }
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
