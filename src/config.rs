use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Which bus to connect to.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BusKind {
    /// The per-login session bus (default; where the Secret Service lives)
    #[default]
    Session,
    /// The system-wide bus
    System,
    /// An explicit D-Bus address given in `address`
    Address,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BusConfig {
    #[serde(default)]
    pub kind: BusKind,

    /// D-Bus address, e.g. `unix:path=/run/user/1000/bus`. Required for `kind = "address"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Method call timeout in seconds. No timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_timeout_secs: Option<u64>,

    /// Queued signal payloads per subscription before the reader waits
    #[serde(default = "default_signal_buffer")]
    pub signal_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: BusKind::default(),
            address: None,
            method_timeout_secs: None,
            signal_buffer: default_signal_buffer(),
        }
    }
}

fn default_signal_buffer() -> usize {
    64
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub bus: BusConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            bus: BusConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "secretbus", "secretbus")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, or defaults if there is no file
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load and validate a specific config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        match (self.bus.kind, self.bus.address.as_deref()) {
            (BusKind::Address, None) => {
                return Err(ConfigError::ValidationError(
                    "bus kind \"address\" requires bus.address".into(),
                ));
            }
            (BusKind::Address, Some(address)) if !address.contains(':') => {
                return Err(ConfigError::ValidationError(format!(
                    "bus.address '{}' is not a D-Bus address (expected transport:key=value)",
                    address
                )));
            }
            (BusKind::Session | BusKind::System, Some(_)) => {
                return Err(ConfigError::ValidationError(
                    "bus.address is only used with kind = \"address\"".into(),
                ));
            }
            _ => {}
        }

        if self.bus.method_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError(
                "method_timeout_secs must be positive (omit it for no timeout)".into(),
            ));
        }

        if self.bus.signal_buffer == 0 {
            return Err(ConfigError::ValidationError(
                "signal_buffer must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Serialize as it would be written to `config.toml`
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save config to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml()?)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }
}
