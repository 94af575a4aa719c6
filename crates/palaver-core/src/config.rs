use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{PalaverError, Result};

/// Signing secret used when none is configured. The binary warns when it is
/// still in effect at startup.
pub const DEFAULT_JWT_SECRET: &str = "change-me";

/// Upper bound on token lifetime (ten years).
pub const MAX_TOKEN_TTL_HOURS: u32 = 24 * 365 * 10;

/// Top-level configuration for the Palaver server.
///
/// Loaded from `~/.palaver/config.toml` by default. Each section corresponds
/// to one component; the signing secret and the generation endpoint are
/// handed to component constructors from here rather than living as globals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PalaverConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl PalaverConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PalaverConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(PalaverError::Config(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&self.auth.token_ttl_hours) {
            return Err(PalaverError::Config(format!(
                "auth.token_ttl_hours must be within 1..={}, got {}",
                MAX_TOKEN_TTL_HOURS, self.auth.token_ttl_hours
            )));
        }
        if self.generation.endpoint.trim().is_empty() {
            return Err(PalaverError::Config(
                "generation.endpoint must not be empty".to_string(),
            ));
        }
        if self.generation.model.trim().is_empty() {
            return Err(PalaverError::Config(
                "generation.model must not be empty".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(PalaverError::Config(format!(
                "generation.temperature must be within 0.0..=2.0, got {}",
                self.generation.temperature
            )));
        }
        if self.chat.bot_tag.trim().is_empty() {
            return Err(PalaverError::Config(
                "chat.bot_tag must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// General process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.palaver/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Maximum accepted request body size.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            body_limit_bytes: 1024 * 1024,
        }
    }
}

/// Access token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify access tokens.
    pub jwt_secret: String,
    /// Token lifetime from issuance.
    pub token_ttl_hours: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: 72,
        }
    }
}

/// Upstream text-generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Line-delimited streaming JSON endpoint.
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    /// Max-output-token hint forwarded to the model.
    pub max_tokens: u32,
    /// Whole-request timeout. Unset means the call may block indefinitely.
    pub request_timeout_secs: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://ia:11434/api/generate".to_string(),
            model: "mistral".to_string(),
            temperature: 0.7,
            max_tokens: 300,
            request_timeout_secs: None,
        }
    }
}

/// Conversation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Sender tag recorded on generated turns.
    pub bot_tag: String,
    /// Keep only the most recent N turns in the prompt. Unset keeps all.
    pub max_context_turns: Option<usize>,
    /// Drop oldest turns until the history fits in N characters. Unset keeps all.
    pub max_context_chars: Option<usize>,
    /// Serialize conversations from the same username.
    pub serialize_per_user: bool,
    /// Put `/chat-ai` behind the bearer-token gate.
    pub require_auth: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            bot_tag: "bot".to_string(),
            max_context_turns: None,
            max_context_chars: None,
            serialize_per_user: true,
            require_auth: false,
        }
    }
}
