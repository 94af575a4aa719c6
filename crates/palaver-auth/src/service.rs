//! Auth service: registration, login, and bearer verification.

use tracing::{info, warn};

use palaver_core::error::PalaverError;
use palaver_core::types::User;
use palaver_storage::UserRepository;

use crate::error::AuthError;
use crate::password::{hash_password, verify_password};
use crate::token::{AccessToken, Claims, TokenIssuer};

const BEARER_PREFIX: &str = "Bearer ";

pub struct AuthService {
    users: UserRepository,
    tokens: TokenIssuer,
}

impl AuthService {
    pub fn new(users: UserRepository, tokens: TokenIssuer) -> Self {
        Self { users, tokens }
    }

    /// Create a user with a hashed credential.
    ///
    /// Hashing runs on the blocking pool.
    pub async fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        if username.trim().is_empty() {
            return Err(AuthError::InvalidInput("username must not be empty".to_string()));
        }
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password must not be empty".to_string()));
        }

        let plain = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&plain))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;
        let user = self.users.create(username, &hash).map_err(|e| match e {
            PalaverError::Conflict(_) => AuthError::UsernameTaken(username.to_string()),
            other => AuthError::from(other),
        })?;

        info!(username = %user.username, user_id = user.id, "User registered");
        Ok(user)
    }

    /// Check credentials and issue an access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<AccessToken, AuthError> {
        let user = self
            .users
            .find_by_username(username)?
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

        let Some(hash) = user.password_hash.as_deref().filter(|h| !h.is_empty()) else {
            warn!(username = %username, "Login attempt on chat-only identity");
            return Err(AuthError::InvalidCredentials);
        };

        let plain = password.to_string();
        let hash = hash.to_string();
        let matched = tokio::task::spawn_blocking(move || verify_password(&plain, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;
        if !matched {
            warn!(username = %username, "Login failed: password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.username)?;
        info!(username = %user.username, expires_at = %token.expires_at, "Access token issued");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.verify(token)
    }

    /// Verify the raw value of an `Authorization` header.
    ///
    /// Requires the literal `Bearer ` prefix.
    pub fn verify_bearer(&self, header: Option<&str>) -> Result<Claims, AuthError> {
        let value = header.ok_or(AuthError::MissingHeader)?;
        let token = value
            .strip_prefix(BEARER_PREFIX)
            .ok_or(AuthError::MalformedHeader)?;
        self.verify(token)
    }
}
