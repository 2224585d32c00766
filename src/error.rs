use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::metrics::DESCRIBE_ERRORS;

/// Every failure a request can end with. Per-frame parse failures never get
/// here; the stream translator drops those on its own.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid content type, must be JSON")]
    InvalidContentType,

    #[error("No image data provided")]
    MissingImage,

    #[error("Error communicating with LLaVA server: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidContentType | ApiError::MissingImage => StatusCode::BAD_REQUEST,
            ApiError::UpstreamUnavailable(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // metric label
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidContentType => "invalid_content_type",
            ApiError::MissingImage => "missing_image",
            ApiError::UpstreamUnavailable(_) => "upstream_unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        DESCRIBE_ERRORS.with_label_values(&[self.kind()]).inc();
        if self.status().is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::debug!("rejected request: {}", self);
        }

        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}
