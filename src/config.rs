//! # Configuration Management
//!
//! Centralized configuration for an ALN node: its router, the transports it
//! attaches, the frame parser, and logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! ## Defaults
//! - Channel send queues hold 10 packets; further packets are dropped
//! - The parser accepts frames up to the largest encodable packet
//! - A peer announcing this node withdrawn is answered after 100ms

use crate::core::packet::{MAX_PACKET_SIZE, MAX_STRING_LEN};
use crate::error::{AlnError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;
use uuid::Uuid;

/// Outbound queue depth of a channel
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Delay before re-broadcasting local state after a false withdrawal
pub const DEFAULT_FIGHT_THE_LIE_DELAY: Duration = Duration::from_millis(100);

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AlnConfig {
    /// Router configuration
    #[serde(default)]
    pub router: RouterConfig,

    /// Transport channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Frame parser configuration
    #[serde(default)]
    pub parser: ParserConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AlnConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| AlnError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| AlnError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| AlnError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("ALN_ADDRESS") {
            if !addr.is_empty() {
                config.router.address = Some(addr);
            }
        }

        if let Ok(capacity) = std::env::var("ALN_QUEUE_CAPACITY") {
            config.channel.queue_capacity = capacity.parse::<usize>().map_err(|e| {
                AlnError::ConfigError(format!("Invalid ALN_QUEUE_CAPACITY '{capacity}': {e}"))
            })?;
        }

        if let Ok(size) = std::env::var("ALN_MAX_FRAME_SIZE") {
            config.parser.max_frame_size = size.parse::<usize>().map_err(|e| {
                AlnError::ConfigError(format!("Invalid ALN_MAX_FRAME_SIZE '{size}': {e}"))
            })?;
        }

        if let Ok(delay) = std::env::var("ALN_FIGHT_THE_LIE_DELAY_MS") {
            let millis = delay.parse::<u64>().map_err(|e| {
                AlnError::ConfigError(format!("Invalid ALN_FIGHT_THE_LIE_DELAY_MS '{delay}': {e}"))
            })?;
            config.router.fight_the_lie_delay = Duration::from_millis(millis);
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
        let example = Self::default_with_overrides(|c| {
            c.router.address = Some(String::from("node-1"));
        });
        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AlnError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| AlnError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.router.validate());
        errors.extend(self.channel.validate());
        errors.extend(self.parser.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AlnError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouterConfig {
    /// Address of this node; a random id is generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Wait before answering a withdrawal of this node's own address
    #[serde(with = "duration_serde")]
    pub fight_the_lie_delay: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            address: None,
            fight_the_lie_delay: DEFAULT_FIGHT_THE_LIE_DELAY,
        }
    }
}

impl RouterConfig {
    /// Configured address, or a fresh random one.
    pub fn resolve_address(&self) -> String {
        match &self.address {
            Some(addr) => addr.clone(),
            None => random_address(),
        }
    }

    /// Validate router configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(ref addr) = self.address {
            if addr.is_empty() {
                errors.push("Router address cannot be empty (omit it to generate one)".to_string());
            } else if addr.len() > MAX_STRING_LEN {
                errors.push(format!(
                    "Router address too long: {} bytes (maximum: {MAX_STRING_LEN})",
                    addr.len()
                ));
            }
        }

        if self.fight_the_lie_delay.as_secs() > 60 {
            errors.push("Fight-the-lie delay too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Transport channel configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Packets buffered for the send worker before new ones are dropped
    pub queue_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ChannelConfig {
    /// Validate channel configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.queue_capacity == 0 {
            errors.push("Queue capacity must be greater than 0".to_string());
        } else if self.queue_capacity > 100_000 {
            errors.push(format!(
                "Queue capacity too large: {} (max recommended: 100,000)",
                self.queue_capacity
            ));
        }

        errors
    }
}

/// Frame parser configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParserConfig {
    /// Largest unescaped frame accepted before it is discarded
    pub max_frame_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_PACKET_SIZE,
        }
    }
}

impl ParserConfig {
    /// Validate parser configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // control field plus crc
        if self.max_frame_size < 6 {
            errors.push(format!(
                "Max frame size too small: {} bytes (minimum: 6)",
                self.max_frame_size
            ));
        } else if self.max_frame_size > MAX_PACKET_SIZE {
            errors.push(format!(
                "Max frame size {} exceeds the largest encodable packet ({MAX_PACKET_SIZE})",
                self.max_frame_size
            ));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to emit ANSI colors
    pub ansi: bool,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("aln-mesh"),
            log_level: Level::INFO,
            ansi: true,
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

        if self.json_format && self.ansi {
            errors.push("ANSI colors cannot be combined with JSON formatting".to_string());
        }

        errors
    }
}

/// Fresh random node id.
fn random_address() -> String {
    Uuid::new_v4().to_string()
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
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
