//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use palaver_auth::{AuthService, TokenIssuer};
use palaver_chat::{
    ConversationEngine, EngineSettings, KeywordResponder, OllamaClient, TextGenerator,
};
use palaver_core::config::PalaverConfig;
use palaver_core::error::PalaverError;
use palaver_storage::{Database, DialogueRepository, ItemRepository, UserRepository};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks. The
/// configuration is fixed for the lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PalaverConfig>,
    pub auth: Arc<AuthService>,
    pub engine: Arc<ConversationEngine>,
    pub keyword: KeywordResponder,
    pub items: ItemRepository,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Build the state with an HTTP client for the configured generation
    /// endpoint.
    pub fn from_config(config: PalaverConfig, database: Database) -> Result<Self, PalaverError> {
        let timeout = config
            .generation
            .request_timeout_secs
            .map(Duration::from_secs);
        let client = OllamaClient::new(&config.generation.endpoint, timeout)
            .map_err(|e| PalaverError::Config(e.to_string()))?;
        Ok(Self::with_generator(config, database, Arc::new(client)))
    }

    /// Build the state around any text generator.
    pub fn with_generator(
        config: PalaverConfig,
        database: Database,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let database = Arc::new(database);
        let users = UserRepository::new(Arc::clone(&database));

        let tokens = TokenIssuer::new(
            &config.auth.jwt_secret,
            chrono::Duration::hours(i64::from(config.auth.token_ttl_hours)),
        );
        let auth = AuthService::new(users.clone(), tokens);

        let engine = ConversationEngine::new(
            users,
            DialogueRepository::new(Arc::clone(&database)),
            generator,
            EngineSettings::from_config(&config.generation, &config.chat),
        );

        Self {
            items: ItemRepository::new(Arc::clone(&database)),
            config: Arc::new(config),
            auth: Arc::new(auth),
            engine: Arc::new(engine),
            keyword: KeywordResponder::new(),
            start_time: Instant::now(),
        }
    }
}
