//! HTTP mapping of service errors.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pmboard_access::AccessError;
use thiserror::Error;
use tracing::error;

use crate::handlers::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Access(#[from] AccessError),

    /// Missing or malformed `Authorization` header.
    #[error("Unauthorized")]
    MissingToken,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Access(AccessError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Access(AccessError::DuplicateKey(_)) => StatusCode::BAD_REQUEST,
            ApiError::Access(AccessError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Access(AccessError::Forbidden(_)) => StatusCode::FORBIDDEN,
            ApiError::Access(AccessError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ApiError::Access(AccessError::State(_) | AccessError::PasswordHash(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::MissingToken => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal failures are logged here and never echoed to the caller.
        let message = match &self {
            ApiError::Access(e) if e.is_internal() => {
                error!(error = %e, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ApiResponse::<()>::err(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmboard_state::StateError;

    #[test]
    fn status_mapping() {
        let cases = [
            (AccessError::validation("x"), StatusCode::BAD_REQUEST),
            (AccessError::DuplicateKey("x".into()), StatusCode::BAD_REQUEST),
            (AccessError::not_found("x"), StatusCode::NOT_FOUND),
            (AccessError::forbidden(), StatusCode::FORBIDDEN),
            (AccessError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (
                AccessError::State(StateError::Write("disk".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AccessError::PasswordHash("salt".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
    }

    #[test]
    fn internal_errors_are_not_echoed() {
        let resp = ApiError::from(AccessError::State(StateError::Write("secret path".into()))).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
