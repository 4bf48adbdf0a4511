//! Session-layer error taxonomy.
//!
//! Every fallible operation on the session layer returns one of these kinds.
//! Validation errors are detected before touching hardware and never retried;
//! hardware failures are wrapped unchanged in [`Error::Hardware`]. The type
//! is `Clone` so read events can carry errors to many subscribers.

use crate::port::PortError;
use thiserror::Error;

/// A specialized `Result` type for session-layer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the session layer.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The named port does not exist on this system.
    #[error("port not found")]
    PortNotFound,

    /// The port is already open by this client.
    #[error("port is already open")]
    PortAlreadyOpen,

    /// No session exists for the named port.
    #[error("port is not open")]
    PortNotOpen,

    /// The port is held by another session and cannot be shared.
    #[error("port is locked by another client")]
    PortLocked,

    /// The session identifier does not match the live session.
    #[error("invalid session id")]
    InvalidSession,

    /// The supplied port configuration is out of range.
    #[error("invalid port configuration: {0}")]
    InvalidConfig(String),

    /// A caller-imposed write deadline elapsed.
    #[error("write timeout")]
    WriteTimeout,

    /// A caller-imposed read deadline elapsed.
    #[error("read timeout")]
    ReadTimeout,

    /// The session exists but has already been torn down.
    #[error("port has been closed")]
    PortClosed,

    /// The underlying transport reported a failure.
    #[error(transparent)]
    Hardware(#[from] PortError),
}

impl Error {
    /// Whether this error ends a continuous read stream.
    ///
    /// Once the session is gone every further read fails the same way, so
    /// the read loop stops instead of spinning; any other failure is treated
    /// as a transient hardware hiccup.
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            Error::PortClosed | Error::InvalidSession | Error::PortNotOpen
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_keeps_kinds_distinguishable() {
        assert_eq!(Error::PortLocked.to_string(), "port is locked by another client");
        assert_eq!(Error::PortNotFound.to_string(), "port not found");
        assert_eq!(
            Error::InvalidConfig("invalid baud rate: 0".into()).to_string(),
            "invalid port configuration: invalid baud rate: 0"
        );
    }

    #[test]
    fn test_hardware_errors_pass_through() {
        let err = Error::from(PortError::config("mode rejected"));
        assert_eq!(err.to_string(), "configuration error: mode rejected");
    }

    #[test]
    fn test_stream_fatality_classification() {
        assert!(Error::PortClosed.ends_stream());
        assert!(Error::InvalidSession.ends_stream());
        assert!(Error::PortNotOpen.ends_stream());
        assert!(!Error::ReadTimeout.ends_stream());
        assert!(!Error::from(PortError::config("glitch")).ends_stream());
    }
}
