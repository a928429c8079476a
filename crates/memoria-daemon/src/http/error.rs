//! Maps [`CoreError`] onto the HTTP status codes and JSON error envelope
//! spec.md's error-handling section describes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use memoria_core::error::CoreError;

/// Wraps a [`CoreError`] so it can be returned directly from a handler via `?`.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::EmbedderFailed(_) | CoreError::LlmFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            CoreError::Shutdown => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = self.0.to_string();
        let body = match &self.0 {
            CoreError::InvalidInput(_) => serde_json::json!({"success": false, "error": message, "details": message}),
            _ => serde_json::json!({"success": false, "error": message}),
        };
        (status, Json(body)).into_response()
    }
}
