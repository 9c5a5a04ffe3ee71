//! Configuration system for the `MatchChat` server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/matchchat/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use matchchat_proto::message::DEFAULT_MAX_TEXT_LEN;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// No token secret was configured anywhere.
    #[error("jwt secret is not set (use --jwt-secret, JWT_SECRET, or [auth] jwt_secret)")]
    MissingJwtSecret,
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerSection,
    storage: StorageSection,
    auth: AuthSection,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_text_len: Option<usize>,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

/// `[storage]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    database_path: Option<PathBuf>,
}

/// `[auth]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthSection {
    jwt_secret: Option<String>,
    require_ws_auth: Option<bool>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "MatchChat messaging server")]
pub struct ServerCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "MATCHCHAT_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/matchchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SQLite database file; messages are kept in memory when unset.
    #[arg(long, env = "MATCHCHAT_DB")]
    pub database: Option<PathBuf>,

    /// Secret used to verify HS256 bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Maximum message text size in bytes.
    #[arg(long)]
    pub max_text_len: Option<usize>,

    /// Refuse WebSocket connections that carry no valid token
    /// (`--require-ws-auth` alone means `true`).
    #[arg(
        long,
        env = "MATCHCHAT_REQUIRE_WS_AUTH",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub require_ws_auth: Option<bool>,

    /// Write logs to this file instead of stdout.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "MATCHCHAT_LOG")]
    pub log_level: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:5000`).
    pub bind_addr: String,
    /// SQLite database file, or `None` for the in-memory store.
    pub database_path: Option<PathBuf>,
    /// Secret used to verify bearer tokens.
    pub jwt_secret: String,
    /// Maximum message text size in bytes.
    pub max_text_len: usize,
    /// Whether WebSocket upgrades require a token.
    pub require_ws_auth: bool,
    /// Log file, or `None` for stdout.
    pub log_file: Option<PathBuf>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            database_path: None,
            jwt_secret: String::new(),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
            require_ws_auth: false,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if no JWT secret is configured.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        if config.jwt_secret.is_empty() {
            return Err(ConfigError::MissingJwtSecret);
        }
        Ok(config)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            database_path: cli
                .database
                .clone()
                .or_else(|| file.storage.database_path.clone()),
            jwt_secret: cli
                .jwt_secret
                .clone()
                .or_else(|| file.auth.jwt_secret.clone())
                .unwrap_or(defaults.jwt_secret),
            max_text_len: cli
                .max_text_len
                .or(file.server.max_text_len)
                .unwrap_or(defaults.max_text_len),
            require_ws_auth: cli
                .require_ws_auth
                .or(file.auth.require_ws_auth)
                .unwrap_or(defaults.require_ws_auth),
            log_file: cli.log_file.clone().or_else(|| file.server.log_file.clone()),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.server.log_level.clone())
                .unwrap_or(defaults.log_level),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file for the server.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("matchchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
