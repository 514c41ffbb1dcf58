use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use leasehold_core::{AckError, ClaimError, EnqueueError, StorageError};
use serde_json::json;
use tracing::error;

/// An error response: a status code and a `{"error": "..."}` body.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub trait IntoApiError {
    fn into_api_error(self) -> ApiError;
}

impl IntoApiError for StorageError {
    fn into_api_error(self) -> ApiError {
        let status = if self.is_retryable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            error!(error = %self, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError::new(status, self.to_string())
    }
}

impl IntoApiError for EnqueueError {
    fn into_api_error(self) -> ApiError {
        match self {
            EnqueueError::Invalid(e) => ApiError::bad_request(e.to_string()),
            EnqueueError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for ClaimError {
    fn into_api_error(self) -> ApiError {
        match self {
            ClaimError::Invalid(e) => ApiError::bad_request(e.to_string()),
            ClaimError::Storage(e) => e.into_api_error(),
        }
    }
}

impl IntoApiError for AckError {
    fn into_api_error(self) -> ApiError {
        match self {
            AckError::Invalid(e) => ApiError::bad_request(e.to_string()),
            AckError::Storage(e) => e.into_api_error(),
        }
    }
}

// Extractor rejections keep their status but use the JSON error body.

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::new(rejection.status(), rejection.body_text())
    }
}
