//! Palaver application binary - composition root.
//!
//! 1. Resolve configuration (CLI > env > TOML file > defaults)
//! 2. Initialize tracing
//! 3. Open the SQLite database
//! 4. Build the shared state and start the axum server

mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use palaver_api::routes;
use palaver_api::state::AppState;
use palaver_core::config::{PalaverConfig, DEFAULT_JWT_SECRET};
use palaver_storage::Database;

use crate::cli::{expand_home, CliArgs};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_file = args.resolve_config_path();
    let config_exists = config_file.exists();
    let mut config = if config_exists {
        PalaverConfig::load(&config_file)?
    } else {
        PalaverConfig::default()
    };
    args.apply_overrides(&mut config);

    // RUST_LOG wins over the resolved level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Palaver v{}", env!("CARGO_PKG_VERSION"));
    if config_exists {
        tracing::info!(path = %config_file.display(), "Configuration loaded");
    } else {
        tracing::info!(path = %config_file.display(), "No configuration file, using defaults");
    }

    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    if config.auth.jwt_secret == DEFAULT_JWT_SECRET {
        tracing::warn!("Using the built-in token secret; set PALAVER_JWT_SECRET in production");
    }

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("palaver.db");
    let db = Database::new(&db_path)?;
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    let state = AppState::from_config(config.clone(), db)?;
    tracing::info!(
        endpoint = %config.generation.endpoint,
        model = %config.generation.model,
        chat_gated = config.chat.require_auth,
        "Conversation engine ready"
    );

    routes::start_server(&config, state).await?;
    Ok(())
}
