//! Session manager: the authority over which client may open which port.
//!
//! Holds the registry mapping port names and session identifiers to live
//! [`Session`]s. Registry mutations happen under one coarse lock; hardware
//! I/O happens under the per-session mutex, so operations on different
//! sessions never contend with each other.

use crate::error::{Error, Result};
use crate::port::{PortConfig, PortError, SystemTransportFactory, TransportFactory};
use crate::session::{Session, SessionId, SessionStatus, RAW_SUBSCRIBER_BUFFER};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Lookup tables for live sessions.
///
/// A port name maps to a list because shared access (when globally enabled
/// and unopposed by either side) permits several coexisting sessions on one
/// name, each with its own identifier and bookkeeping.
#[derive(Default)]
struct Registry {
    by_name: HashMap<String, Vec<Arc<Session>>>,
    by_id: HashMap<SessionId, Arc<Session>>,
}

impl Registry {
    fn remove(&mut self, session: &Arc<Session>) {
        let now_empty = match self.by_name.get_mut(session.port_name()) {
            Some(list) => {
                list.retain(|s| s.id() != session.id());
                list.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.by_name.remove(session.port_name());
        }
        self.by_id.remove(&session.id());
    }
}

/// Manages serial port sessions and operations.
pub struct SessionManager {
    registry: RwLock<Registry>,
    allow_shared_access: bool,
    default_config: PortConfig,
    factory: Arc<dyn TransportFactory>,
}

impl SessionManager {
    /// Create a manager that opens real serial ports.
    pub fn new(allow_shared_access: bool, default_config: PortConfig) -> Self {
        Self::with_factory(
            allow_shared_access,
            default_config,
            Arc::new(SystemTransportFactory),
        )
    }

    /// Create a manager over an injected transport factory (mocks in tests).
    pub fn with_factory(
        allow_shared_access: bool,
        default_config: PortConfig,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            allow_shared_access,
            default_config,
            factory,
        }
    }

    pub fn allow_shared_access(&self) -> bool {
        self.allow_shared_access
    }

    /// The agent-wide default port configuration.
    pub fn default_config(&self) -> &PortConfig {
        &self.default_config
    }

    /// Open a serial port and create a new session.
    ///
    /// Fails with `InvalidConfig` before touching hardware, with `PortLocked`
    /// if another session holds the name and sharing is not permitted, and
    /// with the transport's error if the physical open fails, in which case
    /// nothing is registered.
    pub fn open_port(
        &self,
        port_name: &str,
        config: PortConfig,
        client_id: &str,
        exclusive: bool,
    ) -> Result<Arc<Session>> {
        config.validate().map_err(Error::InvalidConfig)?;

        // The registry lock is held across the hardware open so two clients
        // racing for the same name cannot both get through the lock check.
        let mut registry = self.registry.write();

        if let Some(existing) = registry.by_name.get(port_name) {
            let any_exclusive = existing.iter().any(|s| s.is_exclusive());
            if any_exclusive || exclusive || !self.allow_shared_access {
                return Err(Error::PortLocked);
            }
        }

        let mut transport = self
            .factory
            .open(port_name, &config)
            .map_err(|e| match e {
                PortError::NotFound(_) => Error::PortNotFound,
                other => Error::Hardware(other),
            })?;

        if !config.read_timeout.is_zero() {
            if let Err(e) = transport.set_read_timeout(config.read_timeout) {
                let _ = transport.close();
                return Err(Error::Hardware(e));
            }
        }

        let session = Arc::new(Session::new(
            port_name,
            client_id,
            exclusive,
            config,
            transport,
        ));

        registry
            .by_name
            .entry(port_name.to_string())
            .or_default()
            .push(Arc::clone(&session));
        registry.by_id.insert(session.id(), Arc::clone(&session));

        info!(
            port = %port_name,
            session = %session.id(),
            client = %client_id,
            exclusive,
            "opened serial port"
        );

        Ok(session)
    }

    /// Open a port with the agent-wide default configuration.
    pub fn open_port_with_defaults(
        &self,
        port_name: &str,
        client_id: &str,
        exclusive: bool,
    ) -> Result<Arc<Session>> {
        self.open_port(port_name, self.default_config.clone(), client_id, exclusive)
    }

    /// Close a session.
    ///
    /// The caller must present the live session's identifier; a stale or
    /// foreign identifier fails rather than closing someone else's session.
    /// Registry removal always happens; the transport's close error, if any,
    /// is returned afterwards.
    pub fn close_port(&self, port_name: &str, session_id: SessionId) -> Result<()> {
        let mut registry = self.registry.write();

        let sessions = registry.by_name.get(port_name).ok_or(Error::PortNotOpen)?;
        let session = sessions
            .iter()
            .find(|s| s.id() == session_id)
            .cloned()
            .ok_or(Error::InvalidSession)?;

        self.close_session_locked(&mut registry, &session)
    }

    /// Tear one session down. Must be called with the registry write lock
    /// held.
    fn close_session_locked(&self, registry: &mut Registry, session: &Arc<Session>) -> Result<()> {
        session.mark_closed();
        session.close_subscribers();
        registry.remove(session);

        info!(
            port = %session.port_name(),
            session = %session.id(),
            "closed serial port"
        );

        session.close_transport()
    }

    /// The single gate deciding whether a caller may act on a session right
    /// now. Every data-path operation goes through here.
    pub fn validate_session(&self, port_name: &str, session_id: SessionId) -> Result<Arc<Session>> {
        let registry = self.registry.read();

        let sessions = registry.by_name.get(port_name).ok_or(Error::PortNotOpen)?;
        let session = sessions
            .iter()
            .find(|s| s.id() == session_id)
            .ok_or(Error::InvalidSession)?;

        if session.is_closed() {
            return Err(Error::PortClosed);
        }

        Ok(Arc::clone(session))
    }

    /// Blocking write to a port. Concurrent writers on the same session are
    /// serialized; the hardware error, if any, is returned unchanged.
    pub fn write(&self, port_name: &str, session_id: SessionId, data: &[u8]) -> Result<usize> {
        let session = self.validate_session(port_name, session_id)?;
        session.write_chunk(data)
    }

    /// Blocking read from a port.
    ///
    /// An empty result means the driver timed out with nothing available;
    /// callers distinguish "no data yet" from failure by the error value,
    /// not by emptiness.
    pub fn read(&self, port_name: &str, session_id: SessionId, max_bytes: usize) -> Result<Vec<u8>> {
        let session = self.validate_session(port_name, session_id)?;
        session.read_chunk(max_bytes)
    }

    /// Re-apply hardware mode and read timeout, replacing the stored config
    /// on success. A failed apply leaves the driver state undefined and is
    /// reported, not rolled back.
    pub fn configure(&self, port_name: &str, session_id: SessionId, config: PortConfig) -> Result<()> {
        config.validate().map_err(Error::InvalidConfig)?;
        let session = self.validate_session(port_name, session_id)?;
        session.apply_config(config)
    }

    /// Discard buffered input data at the hardware level.
    pub fn flush(&self, port_name: &str, session_id: SessionId) -> Result<()> {
        let session = self.validate_session(port_name, session_id)?;
        session.flush_input()
    }

    /// Status snapshot of the session holding a port.
    pub fn get_status(&self, port_name: &str) -> Result<SessionStatus> {
        let registry = self.registry.read();
        let sessions = registry.by_name.get(port_name).ok_or(Error::PortNotOpen)?;
        let session = sessions.first().ok_or(Error::PortNotOpen)?;
        Ok(session.status())
    }

    /// Names of all open ports, sorted for deterministic output.
    pub fn list_open_ports(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut ports: Vec<String> = registry.by_name.keys().cloned().collect();
        ports.sort();
        ports
    }

    /// The session currently holding a port, if any. With shared access this
    /// is the longest-lived one.
    pub fn get_session(&self, port_name: &str) -> Option<Arc<Session>> {
        let registry = self.registry.read();
        registry
            .by_name
            .get(port_name)
            .and_then(|list| list.first())
            .cloned()
    }

    /// Look a session up by its identifier.
    pub fn get_session_by_id(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.registry.read().by_id.get(&session_id).cloned()
    }

    /// Register a raw-chunk subscriber on a session. Every successful
    /// non-empty read on the session is fanned out to the returned channel;
    /// the channel closes when the session does.
    pub fn subscribe_to_reads(
        &self,
        port_name: &str,
        session_id: SessionId,
    ) -> Result<mpsc::Receiver<Vec<u8>>> {
        let session = self.validate_session(port_name, session_id)?;
        let (tx, rx) = mpsc::channel(RAW_SUBSCRIBER_BUFFER);
        session.add_subscriber(tx);
        Ok(rx)
    }

    /// Best-effort teardown of every live session, used at process shutdown.
    /// Individual close errors are logged, never propagated; shutdown must
    /// proceed regardless.
    pub fn close_all(&self) {
        let mut registry = self.registry.write();
        let sessions: Vec<Arc<Session>> = registry.by_id.values().cloned().collect();

        for session in sessions {
            if let Err(e) = self.close_session_locked(&mut registry, &session) {
                warn!(
                    port = %session.port_name(),
                    session = %session.id(),
                    error = %e,
                    "error closing port during shutdown"
                );
            }
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.read();
        f.debug_struct("SessionManager")
            .field("open_sessions", &registry.by_id.len())
            .field("allow_shared_access", &self.allow_shared_access)
            .finish()
    }
}
