use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saddogs::StoreError;
use saddogs::types::InvalidDate;

/// Handler error rendered as `{"detail": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    /// The payload or the table rejected the write.
    BadRequest(String),
    /// Transport, decode or configuration failure talking to the table.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::BadRequest(msg) | Self::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::BadRequest(msg) => log::warn!("Rejected request: {}", msg),
            Self::Internal(msg) => log::error!("Request failed: {}", msg),
        }
        let body = serde_json::json!({ "detail": self.detail() });
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected { message, .. } => Self::BadRequest(message),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<InvalidDate> for ApiError {
    fn from(err: InvalidDate) -> Self {
        Self::BadRequest(err.to_string())
    }
}
