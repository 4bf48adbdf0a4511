//! Caller-side deadlines for blocking port I/O.
//!
//! The port's own configured timeout bounds the driver's blocking behavior;
//! these helpers bound the caller's patience. The blocking call runs on the
//! blocking thread pool and races a timer. If the timer fires first, the
//! call is abandoned, not cancelled (the hardware has no cancellation
//! primitive), and it eventually returns or errors on its own.

use crate::error::{Error, Result};
use crate::manager::SessionManager;
use crate::port::PortError;
use crate::session::SessionId;
use std::sync::Arc;
use std::time::Duration;

/// Read with an externally imposed deadline.
///
/// Returns `ReadTimeout` if the deadline elapses first, even though the
/// underlying read may still be in flight.
pub async fn read_with_timeout(
    manager: &Arc<SessionManager>,
    port_name: &str,
    session_id: SessionId,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let manager = Arc::clone(manager);
    let port_name = port_name.to_string();
    let task =
        tokio::task::spawn_blocking(move || manager.read(&port_name, session_id, max_bytes));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::Hardware(PortError::from(std::io::Error::other(
            join_err,
        )))),
        Err(_) => Err(Error::ReadTimeout),
    }
}

/// Write with an externally imposed deadline.
///
/// Returns `WriteTimeout` if the deadline elapses first; the abandoned write
/// may still reach the hardware.
pub async fn write_with_timeout(
    manager: &Arc<SessionManager>,
    port_name: &str,
    session_id: SessionId,
    data: Vec<u8>,
    timeout: Duration,
) -> Result<usize> {
    let manager = Arc::clone(manager);
    let port_name = port_name.to_string();
    let task = tokio::task::spawn_blocking(move || manager.write(&port_name, session_id, &data));

    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::Hardware(PortError::from(std::io::Error::other(
            join_err,
        )))),
        Err(_) => Err(Error::WriteTimeout),
    }
}
