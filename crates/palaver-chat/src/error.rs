//! Error types for the conversational interface.

use palaver_core::error::PalaverError;

/// Errors from the chat engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("user must not be empty")]
    EmptyUser,
    #[error("invalid generation endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("generation request failed: {0}")]
    Upstream(String),
    #[error("generation service returned HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    #[error("failed to read generation stream: {0}")]
    StreamRead(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PalaverError> for ChatError {
    fn from(err: PalaverError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyUser.to_string(), "user must not be empty");
        assert_eq!(
            ChatError::Upstream("connection refused".into()).to_string(),
            "generation request failed: connection refused"
        );
        assert_eq!(
            ChatError::UpstreamStatus {
                status: 404,
                body: "model not found".into()
            }
            .to_string(),
            "generation service returned HTTP 404: model not found"
        );
        assert_eq!(
            ChatError::StreamRead("reset".into()).to_string(),
            "failed to read generation stream: reset"
        );
    }

    #[test]
    fn test_chat_error_from_palaver_error() {
        let err: ChatError = PalaverError::Storage("connection lost".to_string()).into();
        assert!(matches!(err, ChatError::Storage(_)));
        assert!(err.to_string().contains("connection lost"));
    }
}
