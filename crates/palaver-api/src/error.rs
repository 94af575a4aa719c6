//! API error type and JSON error body.
//!
//! Every failure leaves the server as `{"error": <code>, "message": <text>}`
//! with a matching status code.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use palaver_auth::AuthError;
use palaver_chat::ChatError;
use palaver_core::error::PalaverError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "bad_request", "unauthorized").
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400: malformed or missing input.
    BadRequest(String),
    /// 401: missing, invalid or expired token, or bad credentials.
    Unauthorized(String),
    /// 404: unknown resource id or login username.
    NotFound(String),
    /// 409: duplicate username.
    Conflict(String),
    /// 500: store or generation failure.
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (code, message) = match self {
            ApiError::BadRequest(msg) => ("bad_request", msg),
            ApiError::Unauthorized(msg) => ("unauthorized", msg),
            ApiError::NotFound(msg) => ("not_found", msg),
            ApiError::Conflict(msg) => ("conflict", msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                ("internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PalaverError> for ApiError {
    fn from(err: PalaverError) -> Self {
        match err {
            PalaverError::Conflict(msg) => ApiError::Conflict(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidInput(msg) => ApiError::BadRequest(msg),
            AuthError::UsernameTaken(_) => ApiError::Conflict(err.to_string()),
            AuthError::UnknownUser(_) => ApiError::NotFound(err.to_string()),
            AuthError::Hashing(_) | AuthError::TokenIssue(_) | AuthError::Storage(_) => {
                ApiError::Internal(err.to_string())
            }
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::EmptyUser => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
