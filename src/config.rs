//! Configuration system for chirp.
//!
//! Provides layered configuration from multiple sources:
//!
//! 1. **Compiled defaults** - Sensible defaults built into the binary
//! 2. **User config file** - `~/.config/chirp/config.toml`
//! 3. **Environment variables** - `CHIRP_*` prefix
//! 4. **CLI arguments** - Highest priority, always wins
//!
//! # Example Configuration File
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8000"
//! session_ttl_hours = 168
//!
//! [paths]
//! db = "~/.local/share/chirp/chirp.db"
//!
//! [provider]
//! api_key = "sk-..."
//! default_provider = "openrouter"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Main configuration structure for chirp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Path-related configuration.
    pub paths: PathsConfig,
    /// Provider dispatch configuration.
    pub provider: ProviderConfig,
    /// Output formatting configuration.
    pub output: OutputConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the server binds to.
    /// Environment variable: `CHIRP_BIND`
    pub bind: String,

    /// Session lifetime in hours.
    pub session_ttl_hours: i64,
}

/// Path configuration for the database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Path to the `SQLite` database file.
    /// Environment variable: `CHIRP_DB`
    pub db: Option<PathBuf>,
}

/// Provider dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API credential handed to provider factories.
    /// Environment variable: `CHIRP_API_KEY`
    pub api_key: Option<String>,

    /// Provider used when `--provider` is not given.
    pub default_provider: String,

    /// Model used when `--model` is not given.
    pub default_model: Option<String>,
}

/// Output formatting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Enable colored output.
    pub colors: bool,

    /// Suppress non-essential output.
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            session_ttl_hours: 24 * 7,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: crate::provider::DEFAULT_PROVIDER.to_string(),
            default_model: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            colors: true,
            quiet: false,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. User config file (~/.config/chirp/config.toml)
    /// 3. Compiled defaults
    #[must_use]
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load from user config file
        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        // Override from environment variables
        config.apply_env_overrides();

        debug!("Configuration loaded: {:?}", config);
        config
    }

    /// Load configuration from a specific file.
    #[must_use]
    pub fn load_from_file(path: &PathBuf) -> Option<Self> {
        if !path.exists() {
            debug!("Config file not found: {}", path.display());
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from: {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Load the user configuration file from the standard location.
    fn load_user_config() -> Option<Self> {
        let config_path = Self::user_config_path()?;
        Self::load_from_file(&config_path)
    }

    /// Get the path to the user configuration file.
    #[must_use]
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("chirp").join("config.toml"))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("CHIRP_DB") {
            self.paths.db = Some(PathBuf::from(db));
        }
        if let Ok(bind) = std::env::var("CHIRP_BIND") {
            self.server.bind = bind;
        }
        if let Ok(key) = std::env::var("CHIRP_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Ok(provider) = std::env::var("CHIRP_PROVIDER") {
            self.provider.default_provider = provider;
        }
        if let Ok(model) = std::env::var("CHIRP_MODEL") {
            self.provider.default_model = Some(model);
        }
        if std::env::var("CHIRP_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok() {
            self.output.colors = false;
        }
        if std::env::var("CHIRP_QUIET").is_ok() {
            self.output.quiet = true;
        }
    }

    /// Merge another config into this one (other takes precedence).
    fn merge(&mut self, other: Self) {
        if other.paths.db.is_some() {
            self.paths.db = other.paths.db;
        }

        self.server.bind = other.server.bind;
        self.server.session_ttl_hours = other.server.session_ttl_hours;

        if other.provider.api_key.is_some() {
            self.provider.api_key = other.provider.api_key;
        }
        self.provider.default_provider = other.provider.default_provider;
        if other.provider.default_model.is_some() {
            self.provider.default_model = other.provider.default_model;
        }

        self.output.colors = other.output.colors;
        self.output.quiet = other.output.quiet;
    }

    /// Get the database path, using defaults if not configured.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.paths.db.clone().unwrap_or_else(crate::default_db_path)
    }

    /// Get the session lifetime as a duration.
    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.server.session_ttl_hours.max(1))
    }
}
