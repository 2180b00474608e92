//! # Configuration Management
//!
//! Centralized configuration for a game server node.
//!
//! The core of it is the server's identity on the wire (listen address,
//! protocol version, game variant); the remaining fields tune channel
//! capacity, read granularity, framing and optional deadlines.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()`
//!
//! Configuration is immutable once handed to a [`Server`](crate::service::server::Server).

use crate::core::codec::Framing;
use crate::error::{ProtocolError, Result};
use crate::protocol::game::GameVariant;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Protocol version announced when none is configured
pub const DEFAULT_PROTOCOL_VERSION: &str = "v1";

/// Size of a single read in the peer read loop
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Max allowed length-delimited payload (e.g. 16 MB)
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("POKER_P2P_LISTEN_ADDR") {
            config.server.listen_addr = addr;
        }

        if let Ok(version) = std::env::var("POKER_P2P_VERSION") {
            config.server.version = version;
        }

        if let Ok(variant) = std::env::var("POKER_P2P_GAME_VARIANT") {
            let value = variant.parse::<u8>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid POKER_P2P_GAME_VARIANT: {e}"))
            })?;
            config.server.variant = GameVariant::from(value);
        }

        if let Ok(limit) = std::env::var("POKER_P2P_BACKPRESSURE_LIMIT") {
            config.server.backpressure_limit = limit.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid POKER_P2P_BACKPRESSURE_LIMIT: {e}"))
            })?;
        }

        if let Ok(timeout) = std::env::var("POKER_P2P_HANDSHAKE_TIMEOUT_MS") {
            let millis = timeout.parse::<u64>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid POKER_P2P_HANDSHAKE_TIMEOUT_MS: {e}"))
            })?;
            // 0 disables the deadline
            config.server.handshake_timeout = (millis > 0).then(|| Duration::from_millis(millis));
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = self.server.validate();
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server identity and tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "127.0.0.1:9001")
    pub listen_addr: String,

    /// Protocol version, compared by exact string equality
    pub version: String,

    /// Game variant this node runs
    pub variant: GameVariant,

    /// Capacity of each coordination-loop channel
    pub backpressure_limit: usize,

    /// Size of a single read in a peer's read loop
    pub read_buffer_size: usize,

    /// How payloads are delimited after the handshake
    pub framing: Framing,

    /// Largest accepted length-delimited payload
    pub max_frame_size: usize,

    /// Deadline for receiving a peer's handshake, `None` waits forever
    #[serde(with = "opt_duration_serde")]
    pub handshake_timeout: Option<Duration>,

    /// Idle deadline between reads, `None` waits forever
    #[serde(with = "opt_duration_serde")]
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: String::from("127.0.0.1:9001"),
            version: String::from(DEFAULT_PROTOCOL_VERSION),
            variant: GameVariant::TexasHoldem,
            backpressure_limit: 32,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            framing: Framing::Raw,
            max_frame_size: MAX_PAYLOAD_SIZE,
            handshake_timeout: Some(timeout::HANDSHAKE_TIMEOUT),
            read_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Shorthand for the three values that identify a node on the wire
    pub fn new(listen_addr: impl Into<String>, version: impl Into<String>, variant: GameVariant) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            version: version.into(),
            variant,
            ..Self::default()
        }
    }

    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.listen_addr.is_empty() {
            errors.push("Listen address cannot be empty".to_string());
        } else if !self.listen_addr.contains(':') {
            errors.push(format!(
                "Invalid listen address format: '{}' (expected format: 'host:port')",
                self.listen_addr
            ));
        }

        if self.version.is_empty() {
            errors.push("Protocol version cannot be empty".to_string());
        }

        if self.backpressure_limit == 0 {
            errors.push("Backpressure limit must be greater than 0".to_string());
        } else if self.backpressure_limit > 1_000_000 {
            errors.push(format!(
                "Backpressure limit too large: {} (max recommended: 1,000,000)",
                self.backpressure_limit
            ));
        }

        if self.read_buffer_size == 0 {
            errors.push("Read buffer size must be greater than 0".to_string());
        } else if self.read_buffer_size > MAX_PAYLOAD_SIZE {
            errors.push(format!(
                "Read buffer size too large: {} (maximum: {MAX_PAYLOAD_SIZE})",
                self.read_buffer_size
            ));
        }

        if self.max_frame_size == 0 {
            errors.push("Max frame size must be greater than 0".to_string());
        }

        if let Some(t) = self.handshake_timeout {
            if t.as_millis() < 100 {
                errors.push("Handshake timeout too short (minimum: 100ms)".to_string());
            } else if t.as_secs() > 300 {
                errors.push("Handshake timeout too long (maximum: 300s)".to_string());
            }
        }

        if let Some(t) = self.read_timeout {
            if t.as_millis() < 100 {
                errors.push("Read timeout too short (minimum: 100ms)".to_string());
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name used in log output
    pub app_name: String,

    /// Default log level when `RUST_LOG` is unset
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Emit JSON lines instead of human-readable output
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("poker-p2p"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Optional durations as milliseconds, 0 meaning "no deadline"
mod opt_duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration
            .map_or(0, |d| d.as_millis() as u64)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = Option::<u64>::deserialize(deserializer)?;
        // 0 disables the deadline, same as leaving it out
        Ok(millis.filter(|&ms| ms > 0).map(Duration::from_millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
