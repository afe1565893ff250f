//! Coordinator configuration loading from file and environment variables.

use serde::Deserialize;
use thiserror::Error;

/// Top-level coordinator configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External ledger mirror settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Gateway notification sink settings.
    #[serde(default)]
    pub gateway_sink: GatewaySinkConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "concord_coordinator=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// External ledger mirror configuration. Disabled by default; when
/// disabled, every mirror call is a no-op.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of the ledger service.
    #[serde(default)]
    pub base_url: String,
}

/// Gateway notification sink configuration. An empty base URL disables
/// gateway push entirely.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewaySinkConfig {
    /// Base URL of the gateway callback endpoint.
    #[serde(default)]
    pub base_url: String,
}

fn default_db_path() -> String {
    "concord.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CONCORD_DB_PATH` overrides `database.path`
/// - `CONCORD_LOG_LEVEL` overrides `logging.level`
/// - `CONCORD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `CONCORD_LEDGER_ENABLED` overrides `ledger.enabled`
/// - `CONCORD_LEDGER_URL` overrides `ledger.base_url`
/// - `CONCORD_GATEWAY_SINK_URL` overrides `gateway_sink.base_url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(db_path) = std::env::var("CONCORD_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("CONCORD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("CONCORD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(enabled) = std::env::var("CONCORD_LEDGER_ENABLED") {
        config.ledger.enabled = enabled == "true" || enabled == "1";
    }
    if let Ok(url) = std::env::var("CONCORD_LEDGER_URL") {
        config.ledger.base_url = url;
    }
    if let Ok(url) = std::env::var("CONCORD_GATEWAY_SINK_URL") {
        config.gateway_sink.base_url = url;
    }

    Ok(config)
}
