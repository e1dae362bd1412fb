//! Configuration management for LifeLink.
//!
//! Configuration is read from a TOML file and may be overridden from the
//! environment (`PORT`, `LIFELINK_DB`, `LIFELINK_STORAGE`,
//! `LIFELINK_LOG_JSON`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventsConfig {
    /// Buffered transition events per subscriber before the oldest are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_database_path() -> PathBuf {
    PathBuf::from("lifelink.db")
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            database_path: default_database_path(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl StorageBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Memory => "memory",
            StorageBackend::Sqlite => "sqlite",
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => Err(CoreError::Config(format!("unknown storage backend: {other}"))),
        }
    }
}

impl Config {
    /// Read a TOML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration for a service: the file if given, then
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply process environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| CoreError::Config(format!("PORT is not a valid port: {port}")))?;
        }
        if let Some(path) = lookup("LIFELINK_DB") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("LIFELINK_STORAGE") {
            self.storage.backend = backend.parse()?;
        }
        if let Some(json) = lookup("LIFELINK_LOG_JSON") {
            self.logging.json = matches!(json.trim(), "1" | "true" | "yes");
        }
        Ok(())
    }

    /// Reject configurations the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(CoreError::Config("server.port must be non-zero".into()));
        }
        if self.server.bind_address.trim().is_empty() {
            return Err(CoreError::Config("server.bind_address must be set".into()));
        }
        if self.storage.backend == StorageBackend::Sqlite
            && self.storage.database_path.as_os_str().is_empty()
        {
            return Err(CoreError::Config(
                "storage.database_path is required for the sqlite backend".into(),
            ));
        }
        if self.events.channel_capacity == 0 {
            return Err(CoreError::Config(
                "events.channel_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Socket address string the HTTP service binds to
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }
}
