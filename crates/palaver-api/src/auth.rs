//! Access gate for protected routes.
//!
//! Validates `Authorization: Bearer <token>` and short-circuits with 401
//! before the handler runs. On success the verified username is attached to
//! the request as an [`AuthenticatedUser`] extension.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ApiError;
use crate::state::AppState;

/// Identity established by the access gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

/// Middleware that validates bearer-token authentication.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let header = match req.headers().get(AUTHORIZATION).map(|v| v.to_str()) {
        None => None,
        Some(Ok(value)) => Some(value),
        Some(Err(_)) => {
            return ApiError::Unauthorized("Invalid Authorization header encoding".to_string())
                .into_response();
        }
    };

    match state.auth.verify_bearer(header) {
        Ok(claims) => {
            req.extensions_mut().insert(AuthenticatedUser {
                username: claims.username,
            });
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), reason = %e, "Rejected unauthenticated request");
            ApiError::from(e).into_response()
        }
    }
}
