//! Router setup with all API routes and middleware.

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use palaver_core::config::PalaverConfig;
use palaver_core::error::PalaverError;

use crate::auth::require_auth;
use crate::handlers;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
///
/// The item routes always sit behind the access gate; `/chat-ai` does only
/// when `chat.require_auth` is set.
pub fn create_router(state: AppState) -> Router {
    let gate = from_fn_with_state(state.clone(), require_auth);

    let public_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        .route("/chat", post(handlers::chat));

    let mut chat_ai_route = Router::new().route("/chat-ai", post(handlers::chat_ai));
    if state.config.chat.require_auth {
        chat_ai_route = chat_ai_route.route_layer(gate.clone());
    }

    let protected_routes = Router::new()
        .route(
            "/items",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/items/{id}",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .route_layer(gate);

    let body_limit = state.config.server.body_limit_bytes;

    public_routes
        .merge(chat_ai_route)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the configured address and serve until Ctrl-C.
pub async fn start_server(config: &PalaverConfig, state: AppState) -> Result<(), PalaverError> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| PalaverError::Config(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!(addr = %addr, "Starting API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
