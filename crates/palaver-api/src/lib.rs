//! Palaver API crate - HTTP server, routes, handlers, and access gate.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::AuthenticatedUser;
pub use error::ApiError;
pub use routes::{create_router, start_server};
pub use state::AppState;
