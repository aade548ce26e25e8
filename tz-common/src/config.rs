//! Configuration loading and resolution
//!
//! Every client setting is resolved in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the client starts with defaults.
//! The session token is deliberately absent from the file; it is handed to
//! the intake crate explicitly by whoever obtained it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default TicketZen server (local desktop instance)
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Default status poll cadence
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4000;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

pub const ENV_SERVER_URL: &str = "TZ_SERVER_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "TZ_POLL_INTERVAL_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "TZ_REQUEST_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "TZ_LOG_LEVEL";

/// Client configuration loaded from TOML file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Base URL of the TicketZen server
    #[serde(default)]
    pub server_url: Option<String>,

    /// Status poll interval in milliseconds
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,

    /// HTTP request timeout in milliseconds
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Values supplied on the command line; `None` means "not given"
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub server_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved client settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Server base URL without trailing slash
    pub server_url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub logging: LoggingConfig,
}

impl ClientSettings {
    /// Resolve settings from CLI overrides, environment, TOML and defaults
    pub fn resolve(overrides: &ConfigOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let server_url = overrides
            .server_url
            .clone()
            .or_else(|| env_string(ENV_SERVER_URL))
            .or_else(|| toml_config.server_url.clone())
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let server_url = normalize_server_url(&server_url)?;

        let poll_interval_ms = match overrides.poll_interval_ms {
            Some(ms) => ms,
            None => match env_u64(ENV_POLL_INTERVAL_MS)? {
                Some(ms) => ms,
                None => toml_config
                    .poll_interval_ms
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            },
        };
        if poll_interval_ms == 0 {
            return Err(Error::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let request_timeout_ms = match overrides.request_timeout_ms {
            Some(ms) => ms,
            None => match env_u64(ENV_REQUEST_TIMEOUT_MS)? {
                Some(ms) => ms,
                None => toml_config
                    .request_timeout_ms
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
            },
        };
        if request_timeout_ms == 0 {
            return Err(Error::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }

        let level = overrides
            .log_level
            .clone()
            .or_else(|| env_string(ENV_LOG_LEVEL))
            .unwrap_or_else(|| toml_config.logging.level.clone());

        Ok(Self {
            server_url,
            poll_interval: Duration::from_millis(poll_interval_ms),
            request_timeout: Duration::from_millis(request_timeout_ms),
            logging: LoggingConfig { level },
        })
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            logging: LoggingConfig::default(),
        }
    }
}

/// Platform config file location (`~/.config/ticketzen/intake.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("ticketzen").join("intake.toml"))
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Where the TOML settings came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// File named on the command line
    Explicit(PathBuf),
    /// Platform default file
    DefaultFile(PathBuf),
    /// No config file; compiled defaults apply
    Defaults,
    /// Default file exists but could not be used; compiled defaults apply
    Ignored { path: PathBuf, reason: String },
}

/// TOML settings plus their origin
///
/// Loading happens before the tracing subscriber is installed (the log
/// level is one of the settings), so the origin is reported afterwards
/// through [`LoadedConfig::log_source`].
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
}

impl LoadedConfig {
    /// Log where the settings came from; call once tracing is initialised
    pub fn log_source(&self) {
        match &self.source {
            ConfigSource::Explicit(path) | ConfigSource::DefaultFile(path) => {
                info!("Loaded config from {}", path.display())
            }
            ConfigSource::Defaults => debug!("No config file found, using defaults"),
            ConfigSource::Ignored { path, reason } => {
                warn!("Ignoring config file {}: {}", path.display(), reason)
            }
        }
    }
}

/// Load the config file, degrading to defaults when it is absent
pub fn load_or_default(explicit: Option<&Path>) -> Result<LoadedConfig> {
    load_config(explicit, default_config_path())
}

/// Load `explicit` if given, else the file at `default_path`
///
/// An explicitly requested file must exist and parse. The default file is
/// optional: missing means defaults, unreadable means defaults with the
/// reason recorded in [`ConfigSource::Ignored`].
pub fn load_config(explicit: Option<&Path>, default_path: Option<PathBuf>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        return Ok(LoadedConfig {
            config: load_toml_config(path)?,
            source: ConfigSource::Explicit(path.to_path_buf()),
        });
    }

    let defaults = LoadedConfig {
        config: TomlConfig::default(),
        source: ConfigSource::Defaults,
    };
    let Some(path) = default_path.filter(|p| p.exists()) else {
        return Ok(defaults);
    };

    match load_toml_config(&path) {
        Ok(config) => Ok(LoadedConfig {
            config,
            source: ConfigSource::DefaultFile(path),
        }),
        Err(e) => Ok(LoadedConfig {
            source: ConfigSource::Ignored {
                path,
                reason: e.to_string(),
            },
            ..defaults
        }),
    }
}

fn normalize_server_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(Error::InvalidInput(format!(
            "server URL must start with http:// or https://: {}",
            raw
        )));
    }
    Ok(trimmed.to_string())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match env_string(name) {
        Some(value) => value
            .parse::<u64>()
            .map(Some)
            .map_err(|e| Error::Config(format!("{} is not a valid number: {}", name, e))),
        None => Ok(None),
    }
}
