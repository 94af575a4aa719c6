//! Error types for authentication and token verification.

use palaver_core::error::PalaverError;

/// Errors from the auth service and the bearer-token gate.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("username '{0}' already exists")]
    UsernameTaken(String),
    #[error("user '{0}' not found")]
    UnknownUser(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must use the Bearer scheme")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    TokenExpired,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("failed to issue token: {0}")]
    TokenIssue(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PalaverError> for AuthError {
    fn from(err: PalaverError) -> Self {
        AuthError::Storage(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AuthError::InvalidToken(err.to_string())
    }
}

impl AuthError {
    /// Whether the failure should be reported as 401 Unauthorized.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials
                | AuthError::MissingHeader
                | AuthError::MalformedHeader
                | AuthError::InvalidToken(_)
                | AuthError::TokenExpired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_display() {
        assert_eq!(
            AuthError::UsernameTaken("alice".into()).to_string(),
            "username 'alice' already exists"
        );
        assert_eq!(
            AuthError::UnknownUser("bob".into()).to_string(),
            "user 'bob' not found"
        );
        assert_eq!(AuthError::InvalidCredentials.to_string(), "invalid credentials");
        assert_eq!(AuthError::TokenExpired.to_string(), "token expired");
    }

    #[test]
    fn test_unauthorized_classification() {
        assert!(AuthError::MissingHeader.is_unauthorized());
        assert!(AuthError::InvalidToken("bad".into()).is_unauthorized());
        assert!(AuthError::TokenExpired.is_unauthorized());
        assert!(!AuthError::UnknownUser("x".into()).is_unauthorized());
        assert!(!AuthError::Storage("down".into()).is_unauthorized());
        assert!(!AuthError::TokenIssue("overflow".into()).is_unauthorized());
    }

    #[test]
    fn test_from_palaver_error() {
        let err: AuthError = PalaverError::Storage("locked".into()).into();
        assert!(matches!(err, AuthError::Storage(_)));
        assert!(err.to_string().contains("locked"));
    }
}
