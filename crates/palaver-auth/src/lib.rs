//! Palaver auth crate - registration, login, and signed access tokens.
//!
//! Passwords are hashed with Argon2 and never stored or logged in plaintext.
//! Access tokens are HS256 JWTs carrying the username and an absolute expiry;
//! verification is stateless.

pub mod error;
pub mod password;
pub mod service;
pub mod token;

pub use error::AuthError;
pub use service::AuthService;
pub use token::{AccessToken, Claims, TokenIssuer};
