//! Error types for wpi-is
//!
//! Every handler returns [`ApiResult`]; errors render as
//! `{"error": {"code": ..., "message": ...}}` with a matching status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::inference::InferenceError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. deleting the active model
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Faces found in frame (403); the image was discarded
    #[error("Photo rejected: {faces_detected} face(s) detected. Remove people from the frame.")]
    PrivacyBlocked { faces_detected: u32 },

    /// Inference service not configured or unreachable (503)
    #[error("Inference unavailable: {0}")]
    InferenceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// wpi-common error
    #[error(transparent)]
    Common(#[from] wpi_common::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(wpi_common::Error::Database(err))
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::NotConfigured => {
                ApiError::InferenceUnavailable("No inference endpoint configured".to_string())
            }
            InferenceError::Unreachable(msg) => ApiError::InferenceUnavailable(msg),
            InferenceError::InvalidResponse(msg) => {
                ApiError::Internal(format!("Inference service returned invalid data: {}", msg))
            }
            InferenceError::Rejected(msg) => ApiError::BadRequest(msg),
        }
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::PrivacyBlocked { .. } => (StatusCode::FORBIDDEN, "PRIVACY_BLOCKED"),
            ApiError::InferenceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "INFERENCE_UNAVAILABLE")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            ApiError::Common(err) => match err {
                wpi_common::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                wpi_common::Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                wpi_common::Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
                wpi_common::Error::Database(sqlx::Error::Database(db_err))
                    if db_err.is_unique_violation() =>
                {
                    (StatusCode::CONFLICT, "CONFLICT")
                }
                wpi_common::Error::Database(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", self);
        }

        let mut error = json!({
            "code": error_code,
            "message": self.to_string(),
        });
        if let ApiError::PrivacyBlocked { faces_detected } = &self {
            error["faces_detected"] = json!(faces_detected);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
