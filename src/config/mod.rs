//! Agent configuration.
//!
//! TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of
//! priority):
//!
//! 1. `PORTLINK_CONFIG` environment variable (explicit path)
//! 2. `./portlink.toml` (current directory)
//! 3. The platform config directory (XDG on Linux/macOS, AppData on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! Values can be overridden via `PORTLINK_<SECTION>_<KEY>` variables:
//!
//! - `PORTLINK_SERVER_BIND_ADDRESS=127.0.0.1:50055`
//! - `PORTLINK_SERIAL_BAUD_RATE=115200`
//! - `PORTLINK_LOG_LEVEL=debug`

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{default_config_path, resolve_config_path, save_to_file, ConfigLoader};
pub use schema::{
    AgentConfig, LogFormat, LoggingConfig, PortDefaults, SerialConfig, ServerConfig, TlsConfig,
};
