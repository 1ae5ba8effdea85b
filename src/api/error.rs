//! Maps [`CoreError`] onto an HTTP response, the only place in this crate
//! that knows about status codes.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CoreError;

/// The wire shape of every error response this service returns.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub timestamp_millis: i64,
    pub request_id: String,
}

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            CoreError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        };

        let details = match &self.0 {
            CoreError::Internal { sql_state: Some(s), .. } => Some(s.clone()),
            _ => None,
        };

        tracing::warn!(code = self.0.code(), error = %self.0, "request failed");

        let body = ApiErrorBody {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
            details,
            timestamp_millis: crate::now_millis(),
            request_id: Uuid::new_v4().to_string(),
        };

        (status, Json(body)).into_response()
    }
}
