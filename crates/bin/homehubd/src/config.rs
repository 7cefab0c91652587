//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `homehub.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use homehub_adapter_esphome::EsphomeConfig;
use homehub_app::daemon::DaemonConfig;
use homehub_app::driver_manager::DriverTimeouts;
use homehub_app::ports::StorageConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Device database settings.
    pub storage: StorageSection,
    /// Driver supervision settings.
    pub daemon: DaemonSection,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Per-protocol driver settings.
    pub drivers: DriversConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `127.0.0.1`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Apply pending migrations on startup.
    pub run_migrations: bool,
}

/// Timeouts and intervals of the daemon.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub pairing_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub disconnect_timeout_ms: u64,
    pub liveness_interval_secs: u64,
    pub event_buffer: usize,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

/// Driver families and their settings.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub esphome: EsphomeSection,
    pub matter: DriverToggle,
    #[serde(rename = "virtual")]
    pub virtual_devices: VirtualToggle,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EsphomeSection {
    pub enabled: bool,
    #[serde(flatten)]
    pub settings: EsphomeConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriverToggle {
    pub enabled: bool,
}

/// Simulated devices are opt-in.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VirtualToggle {
    pub enabled: bool,
}

impl Config {
    pub const FILE: &'static str = "homehub.toml";

    /// Load configuration from `homehub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(Self::FILE)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    /// Apply `HOMEHUB_*` overrides; `RUST_LOG` wins over `HOMEHUB_LOG`.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("HOMEHUB_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("HOMEHUB_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("HOMEHUB_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("HOMEHUB_DATA_PATH") {
            self.storage.path = PathBuf::from(val);
        }
        if let Some(val) = var("HOMEHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.storage.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "storage path must not be empty".to_string(),
            ));
        }
        let daemon = &self.daemon;
        for (name, value) in [
            ("pairing_timeout_ms", daemon.pairing_timeout_ms),
            ("connect_timeout_ms", daemon.connect_timeout_ms),
            ("disconnect_timeout_ms", daemon.disconnect_timeout_ms),
            ("liveness_interval_secs", daemon.liveness_interval_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be non-zero")));
            }
        }
        if daemon.event_buffer == 0 {
            return Err(ConfigError::Validation(
                "event_buffer must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Runtime settings for [`HubDaemon::initialize`](homehub_app::daemon::HubDaemon::initialize).
    #[must_use]
    pub fn daemon_config(&self) -> DaemonConfig {
        let mut storage = StorageConfig::new(self.storage.path.clone());
        storage.run_migrations = self.storage.run_migrations;
        DaemonConfig {
            storage,
            timeouts: DriverTimeouts {
                pairing: Duration::from_millis(self.daemon.pairing_timeout_ms),
                connect: Duration::from_millis(self.daemon.connect_timeout_ms),
                disconnect: Duration::from_millis(self.daemon.disconnect_timeout_ms),
            },
            liveness_interval: Duration::from_secs(self.daemon.liveness_interval_secs),
            event_buffer: self.daemon.event_buffer,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8124,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/homehub.db"),
            run_migrations: true,
        }
    }
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            pairing_timeout_ms: 5000,
            connect_timeout_ms: 2000,
            disconnect_timeout_ms: 1000,
            liveness_interval_secs: 30,
            event_buffer: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "homehubd=info,homehub=info,tower_http=info".to_string(),
        }
    }
}

impl Default for EsphomeSection {
    fn default() -> Self {
        Self {
            enabled: true,
            settings: EsphomeConfig::default(),
        }
    }
}

impl Default for DriverToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
