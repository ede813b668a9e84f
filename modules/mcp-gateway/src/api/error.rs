use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use xaa_auth::Problem;

use crate::domain::SessionError;

/// Transport-level failures that are not access gate rejections.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    InvalidRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}

/// Convert gateway errors to problem documents.
#[must_use]
pub fn api_error_to_problem(err: &ApiError) -> Problem {
    match err {
        ApiError::Session(SessionError::NotFound(_)) => Problem::new(
            StatusCode::NOT_FOUND,
            "Session Not Found",
            err.to_string(),
            "session_not_found",
        ),
        ApiError::Session(SessionError::Mismatch { .. }) => Problem::new(
            StatusCode::FORBIDDEN,
            "Session Mismatch",
            "session is bound to a different subject",
            "session_mismatch",
        ),
        ApiError::Session(SessionError::StreamConflict(_)) => Problem::new(
            StatusCode::CONFLICT,
            "Stream Conflict",
            err.to_string(),
            "stream_conflict",
        ),
        ApiError::Session(SessionError::LimitReached) => Problem::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Session Limit Reached",
            err.to_string(),
            "session_limit",
        ),
        ApiError::InvalidRequest(message) => Problem::new(
            StatusCode::BAD_REQUEST,
            "Invalid Request",
            message.clone(),
            "invalid_request",
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::debug!(error = %self, "transport request rejected");
        api_error_to_problem(&self).into_response()
    }
}
