//! Runtime configuration (§6, SPEC_FULL §B.3).
//!
//! A single TOML file with three sections: `network` (the recognized
//! options from §6), `storage` (where persisted state lives), and
//! `logging` (verbosity). Defaults match the spec exactly.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Network/discovery options.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Where identity, contacts, and the queue are persisted.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Logging verbosity.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// The four recognized network options (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local UDP bind port.
    pub udp_port: u16,
    /// Relay server address; presence enables the relay backend.
    pub relay_address: Option<IpAddr>,
    /// Relay UDP port.
    pub relay_port: u16,
    /// Whether to run the mDNS LAN discovery backend.
    pub use_lan_discovery: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            udp_port: default_udp_port(),
            relay_address: None,
            relay_port: default_relay_port(),
            use_lan_discovery: true,
        }
    }
}

fn default_udp_port() -> u16 {
    6666
}

fn default_relay_port() -> u16 {
    7777
}

/// Where durable state lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `identity.json`, `contacts.json`, `queue.json`.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    directories_data_dir().unwrap_or_else(|| PathBuf::from(".dni-im"))
}

fn directories_data_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| Path::new(&home).join(".local/share/dni-im"))
}

/// Logging verbosity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("reading config file: {0}")]
    Io(#[from] std::io::Error),
    /// The config file's TOML was malformed.
    #[error("parsing config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// A recognized option had a value outside its valid range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, or
    /// `ConfigError::Parse` if it is not valid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` if the file exists but is malformed.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Persist this config as TOML to `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Invalid(format!("serializing config: {e}")))?;
        crate::persist::atomic_write(path, toml_str.as_bytes())?;
        Ok(())
    }

    /// The bind address for the UDP transport: `0.0.0.0:<udp_port>`.
    #[must_use]
    pub fn bind_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), self.network.udp_port)
    }

    /// Validate option ranges. `udp_port`/`relay_port` of 0 ask the OS to
    /// pick an ephemeral port and are intentionally allowed through.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `logging.level` is not one of the
    /// five recognized levels.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unrecognized log level: {}",
                self.logging.level
            )));
        }
        Ok(())
    }
}
