//! Transport-level error types.
//!
//! Errors reported by the serial transport itself, separate from the
//! session-layer errors in [`crate::error`]. I/O and backend sources are
//! stored behind `Arc` so the type stays `Clone`; read events carry these
//! errors to every subscriber.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during serial transport operations.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// The specified serial port was not found on the system.
    #[error("serial port not found: {0}")]
    NotFound(String),

    /// An I/O error occurred during port operations.
    #[error("i/o error: {0}")]
    Io(#[source] Arc<std::io::Error>),

    /// The requested parameters cannot be applied to this port.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation timed out.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A backend-specific error occurred.
    #[error("serial port error: {0}")]
    Serial(#[source] Arc<serialport::Error>),
}

impl PortError {
    /// Create a NotFound error from a port name.
    pub fn not_found(port_name: impl Into<String>) -> Self {
        Self::NotFound(port_name.into())
    }

    /// Create a Config error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a Timeout error from a duration.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }
}

impl From<std::io::Error> for PortError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serialport::Error> for PortError {
    fn from(err: serialport::Error) -> Self {
        Self::Serial(Arc::new(err))
    }
}
