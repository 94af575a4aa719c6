//! Route handler functions for all API endpoints.
//!
//! JSON bodies are taken as `Result<Json<T>, JsonRejection>` so malformed
//! input is answered with the same error body as every other failure.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use palaver_core::types::{Item, NewItem};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user: String,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub bot: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// =============================================================================
// Accounts
// =============================================================================

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(creds) = payload?;
    state.auth.register(&creds.username, &creds.password).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered".to_string(),
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(creds) = payload?;
    let issued = state.auth.login(&creds.username, &creds.password).await?;
    Ok(Json(TokenResponse {
        token: issued.token,
    }))
}

// =============================================================================
// Chat
// =============================================================================

/// POST /chat - stateless keyword reply.
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(ChatResponse {
        bot: state.keyword.reply(&req.user, &req.text),
    }))
}

/// POST /chat-ai - history-aware generated reply.
///
/// When the route is gated, the body's `user` must be the token's subject.
pub async fn chat_ai(
    State(state): State<AppState>,
    identity: Option<Extension<AuthenticatedUser>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload?;

    if let Some(Extension(identity)) = identity {
        if identity.username != req.user {
            return Err(ApiError::Unauthorized(
                "token does not belong to this user".to_string(),
            ));
        }
    }

    let outcome = state.engine.converse(&req.user, &req.text).await?;
    if !outcome.persisted {
        tracing::warn!(username = %req.user, "Reply returned without a durable record");
    }
    Ok(Json(ChatResponse { bot: outcome.reply }))
}

// =============================================================================
// Items
// =============================================================================

fn validate_item(item: &NewItem) -> Result<(), ApiError> {
    if item.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".to_string()));
    }
    Ok(())
}

fn item_not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("item {} not found", id))
}

/// GET /items
pub async fn list_items(State(state): State<AppState>) -> Result<Json<Vec<Item>>, ApiError> {
    Ok(Json(state.items.list()?))
}

/// GET /items/{id}
pub async fn get_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Item>, ApiError> {
    let Path(id) = id?;
    state
        .items
        .find_by_id(id)?
        .map(Json)
        .ok_or_else(|| item_not_found(id))
}

/// POST /items
pub async fn create_item(
    State(state): State<AppState>,
    Extension(caller): Extension<AuthenticatedUser>,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> Result<(StatusCode, Json<Item>), ApiError> {
    let Json(new_item) = payload?;
    validate_item(&new_item)?;
    let item = state.items.create(&new_item)?;
    tracing::info!(item_id = item.id, username = %caller.username, "Item created");
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /items/{id}
pub async fn update_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<NewItem>, JsonRejection>,
) -> Result<Json<Item>, ApiError> {
    let Path(id) = id?;
    if state.items.find_by_id(id)?.is_none() {
        return Err(item_not_found(id));
    }
    let Json(new_item) = payload?;
    validate_item(&new_item)?;
    state
        .items
        .update(id, &new_item)?
        .map(Json)
        .ok_or_else(|| item_not_found(id))
}

/// DELETE /items/{id}
pub async fn delete_item(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id?;
    if state.items.delete(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(item_not_found(id))
    }
}

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
