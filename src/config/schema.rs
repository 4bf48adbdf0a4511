//! Configuration schema definitions.
//!
//! Defines the structure of the agent configuration file using serde. All
//! sections carry defaults, so a missing file or a sparse one is fine.

use super::error::{ConfigError, ConfigResult};
use crate::port::{DataBits, FlowControl, Parity, PortConfig, StopBits};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener settings consumed by an embedding protocol layer
    pub server: ServerConfig,
    /// TLS credential paths, validated here and consumed by the embedding layer
    pub tls: TlsConfig,
    /// Serial port defaults and discovery settings
    pub serial: SerialConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AgentConfig {
    /// Check the whole configuration for consistency.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.server.bind_address.is_empty() {
            return Err(ConfigError::validation(
                "server.bind_address",
                "must not be empty",
            ));
        }
        if self.server.max_connections == 0 {
            return Err(ConfigError::validation(
                "server.max_connections",
                "must be at least 1",
            ));
        }
        if self.tls.enabled && (self.tls.cert_file.is_none() || self.tls.key_file.is_none()) {
            return Err(ConfigError::validation(
                "tls",
                "cert_file and key_file are required when TLS is enabled",
            ));
        }

        let defaults = self.serial.defaults.to_port_config()?;
        defaults
            .validate()
            .map_err(|msg| ConfigError::validation("serial.defaults", msg))?;

        self.logging.validate()?;
        Ok(())
    }
}

/// Listener settings for the embedding protocol layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the embedding layer should bind to
    pub bind_address: String,
    /// Maximum concurrent client connections
    pub max_connections: u32,
    /// Per-connection idle timeout in seconds
    pub connection_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:50051".to_string(),
            max_connections: 100,
            connection_timeout_secs: 30,
        }
    }
}

/// TLS credential paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub ca_file: Option<PathBuf>,
}

/// Serial port configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Default parameters for ports opened without an explicit config
    pub defaults: PortDefaults,
    /// Hot-plug polling interval in seconds; zero disables watching
    pub scan_interval_secs: u64,
    /// Regular expressions for port names to hide from discovery
    pub exclude_patterns: Vec<String>,
    /// Permit several non-exclusive sessions on one port name
    pub allow_shared_access: bool,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            defaults: PortDefaults::default(),
            scan_interval_secs: 5,
            exclude_patterns: Vec::new(),
            allow_shared_access: false,
        }
    }
}

impl SerialConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// Default serial port parameters, in file-friendly units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortDefaults {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for PortDefaults {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            read_timeout_ms: 1000,
            write_timeout_ms: 1000,
        }
    }
}

impl PortDefaults {
    /// Convert to the session layer's config type, rejecting out-of-range
    /// numeric fields.
    pub fn to_port_config(&self) -> ConfigResult<PortConfig> {
        let data_bits = DataBits::from_bits(self.data_bits).ok_or_else(|| {
            ConfigError::validation(
                "serial.defaults.data_bits",
                format!("must be 5-8, got {}", self.data_bits),
            )
        })?;

        Ok(PortConfig {
            baud_rate: self.baud_rate,
            data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        })
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> ConfigResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", self.level),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:50051");
        assert_eq!(config.serial.scan_interval_secs, 5);
        assert!(!config.serial.allow_shared_access);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_port_defaults_convert() {
        let defaults = PortDefaults::default();
        let port_config = defaults.to_port_config().unwrap();
        assert_eq!(port_config.baud_rate, 9600);
        assert_eq!(port_config.data_bits, DataBits::Eight);
        assert_eq!(port_config.read_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_bad_data_bits_rejected() {
        let defaults = PortDefaults {
            data_bits: 9,
            ..Default::default()
        };
        assert!(defaults.to_port_config().is_err());
    }

    #[test]
    fn test_tls_requires_credentials() {
        let config = AgentConfig {
            tls: TlsConfig {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let config = AgentConfig {
            logging: LoggingConfig {
                level: "verbose".to_string(),
                format: LogFormat::Text,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sparse_toml_fills_defaults() {
        let config: AgentConfig = toml::from_str(
            r#"
            [serial]
            allow_shared_access = true

            [serial.defaults]
            baud_rate = 115200
            parity = "even"
            "#,
        )
        .unwrap();

        assert!(config.serial.allow_shared_access);
        assert_eq!(config.serial.defaults.baud_rate, 115_200);
        assert_eq!(config.serial.defaults.parity, Parity::Even);
        assert_eq!(config.serial.defaults.data_bits, 8);
        assert_eq!(config.server.max_connections, 100);
    }
}
