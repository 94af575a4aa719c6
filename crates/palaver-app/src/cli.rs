//! CLI argument definitions for the Palaver server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::Parser;

use palaver_core::config::PalaverConfig;

pub const ENV_CONFIG: &str = "PALAVER_CONFIG";
pub const ENV_PORT: &str = "PALAVER_PORT";
pub const ENV_JWT_SECRET: &str = "PALAVER_JWT_SECRET";
pub const ENV_GENERATION_URL: &str = "PALAVER_GENERATION_URL";

/// Palaver - item store, token auth, and a history-aware chat proxy.
#[derive(Parser, Debug)]
#[command(name = "palaver", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// HTTP listen port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > PALAVER_CONFIG > ~/.palaver/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.resolve_config_path_with(|key| std::env::var(key).ok())
    }

    fn resolve_config_path_with(&self, env: impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Some(p) = env(ENV_CONFIG) {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Layer environment variables, then CLI flags, over a loaded config.
    pub fn apply_overrides(&self, config: &mut PalaverConfig) {
        self.apply_overrides_with(config, |key| std::env::var(key).ok());
    }

    fn apply_overrides_with(
        &self,
        config: &mut PalaverConfig,
        env: impl Fn(&str) -> Option<String>,
    ) {
        if let Some(port) = env(ENV_PORT).and_then(|v| v.parse::<u16>().ok()) {
            config.server.port = port;
        }
        if let Some(secret) = env(ENV_JWT_SECRET).filter(|s| !s.is_empty()) {
            config.auth.jwt_secret = secret;
        }
        if let Some(url) = env(ENV_GENERATION_URL).filter(|s| !s.is_empty()) {
            config.generation.endpoint = url;
        }

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref dir) = self.data_dir {
            config.general.data_dir = dir.to_string_lossy().to_string();
        }
        if let Some(ref level) = self.log_level {
            config.general.log_level = level.clone();
        }
    }
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE");
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME");
    home.ok().map(PathBuf::from)
}

fn default_config_path() -> PathBuf {
    match home_dir() {
        Some(home) => home.join(".palaver").join("config.toml"),
        None => PathBuf::from("config.toml"),
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        Some(rest) => home_dir().unwrap_or_else(|| PathBuf::from(".")).join(rest),
        None => PathBuf::from(path),
    }
}
