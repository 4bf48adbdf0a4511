//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::AgentConfig;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "PORTLINK";

/// Config file name
const CONFIG_FILE_NAME: &str = "portlink.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "PORTLINK_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: AgentConfig,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `PORTLINK_CONFIG` environment variable (explicit path)
    /// 2. `./portlink.toml` (current directory)
    /// 3. The platform config directory (XDG on Linux/macOS, AppData on Windows)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override values from any source.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            AgentConfig::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = AgentConfig::default();
        // Env overrides still apply even without a file.
        let _ = apply_env_overrides(&mut config);

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> AgentConfig {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(path) = default_config_path() {
        if path.exists() {
            return Some(path);
        }
    }

    // 4. No config file found - defaults apply
    None
}

/// Default configuration file location for this platform.
pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "portlink").map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<AgentConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file, creating parent directories as needed.
pub fn save_to_file(config: &AgentConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Apply environment variable overrides to the configuration.
///
/// Variables follow the pattern `PORTLINK_<SECTION>_<KEY>`, for example:
/// - `PORTLINK_SERVER_BIND_ADDRESS=127.0.0.1:50055`
/// - `PORTLINK_SERIAL_BAUD_RATE=115200`
/// - `PORTLINK_LOG_LEVEL=debug`
fn apply_env_overrides(config: &mut AgentConfig) -> ConfigResult<()> {
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERVER_BIND_ADDRESS")) {
        config.server.bind_address = val;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERVER_MAX_CONNECTIONS")) {
        config.server.max_connections = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{ENV_PREFIX}_SERVER_MAX_CONNECTIONS"),
                "invalid connection count",
            )
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_LOG_LEVEL")) {
        config.logging.level = val;
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_TLS_ENABLED")) {
        config.tls.enabled = val == "true" || val == "1";
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_TLS_CERT")) {
        config.tls.cert_file = Some(PathBuf::from(val));
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_TLS_KEY")) {
        config.tls.key_file = Some(PathBuf::from(val));
    }

    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_BAUD_RATE")) {
        config.serial.defaults.baud_rate = val.parse().map_err(|_| {
            ConfigError::env_parse(format!("{ENV_PREFIX}_SERIAL_BAUD_RATE"), "invalid baud rate")
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_SCAN_INTERVAL_SECS")) {
        config.serial.scan_interval_secs = val.parse().map_err(|_| {
            ConfigError::env_parse(
                format!("{ENV_PREFIX}_SERIAL_SCAN_INTERVAL_SECS"),
                "invalid interval",
            )
        })?;
    }
    if let Ok(val) = std::env::var(format!("{ENV_PREFIX}_SERIAL_ALLOW_SHARED")) {
        config.serial.allow_shared_access = val == "true" || val == "1";
    }

    Ok(())
}
