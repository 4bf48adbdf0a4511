//! Session state for one open serial port.
//!
//! A [`Session`] is the unit of ownership over an open port: it holds the
//! transport handle exclusively, the owning client's identity, the active
//! configuration and usage statistics. All hardware I/O goes through the
//! session so the per-session mutex serializes concurrent callers.

use crate::error::{Error, Result};
use crate::port::{PortConfig, SerialTransport};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of a live session, distinct from the port name.
///
/// Issued fresh at open time and never reused, so a stale caller cannot be
/// confused with a client that reopened the same port name later.
pub type SessionId = Uuid;

/// Buffer capacity of a raw-chunk subscriber channel. When a subscriber
/// falls this far behind, further chunks are dropped for it rather than
/// stalling the hardware read path.
pub(crate) const RAW_SUBSCRIBER_BUFFER: usize = 100;

/// Usage counters for a session. Counters only ever grow while the session
/// lives.
#[derive(Debug)]
pub struct SessionStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    errors: AtomicU64,
    subscriber_drops: AtomicU64,
    opened_at: DateTime<Utc>,
    last_activity: Mutex<DateTime<Utc>>,
}

impl SessionStats {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            subscriber_drops: AtomicU64::new(0),
            opened_at: now,
            last_activity: Mutex::new(now),
        }
    }

    fn record_sent(&self, n: usize) {
        self.bytes_sent.fetch_add(n as u64, Ordering::Relaxed);
        self.touch();
    }

    fn record_received(&self, n: usize) {
        self.bytes_received.fetch_add(n as u64, Ordering::Relaxed);
        self.touch();
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.subscriber_drops.fetch_add(1, Ordering::Relaxed);
    }

    fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn subscriber_drops(&self) -> u64 {
        self.subscriber_drops.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of the counters, for status reporting.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent(),
            bytes_received: self.bytes_received(),
            errors: self.errors(),
            subscriber_drops: self.subscriber_drops(),
            opened_at: self.opened_at,
            last_activity: *self.last_activity.lock(),
        }
    }
}

/// Serializable copy of [`SessionStats`].
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub errors: u64,
    pub subscriber_drops: u64,
    pub opened_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Serializable view of a session, for status queries.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: SessionId,
    pub port_name: String,
    pub client_id: String,
    pub exclusive: bool,
    pub config: PortConfig,
    pub stats: StatsSnapshot,
}

/// An active serial port session.
pub struct Session {
    id: SessionId,
    port_name: String,
    client_id: String,
    exclusive: bool,
    config: RwLock<PortConfig>,
    stats: SessionStats,
    /// The hardware handle. `None` once the session has been torn down, so
    /// a caller racing a close observes `PortClosed` instead of touching a
    /// dead handle.
    transport: Mutex<Option<Box<dyn SerialTransport>>>,
    closed: AtomicBool,
    /// Raw-chunk subscribers; senders are dropped on close so receivers see
    /// end-of-stream.
    subscribers: Mutex<Vec<mpsc::Sender<Vec<u8>>>>,
}

impl Session {
    pub(crate) fn new(
        port_name: impl Into<String>,
        client_id: impl Into<String>,
        exclusive: bool,
        config: PortConfig,
        transport: Box<dyn SerialTransport>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            port_name: port_name.into(),
            client_id: client_id.into(),
            exclusive,
            config: RwLock::new(config),
            stats: SessionStats::new(),
            transport: Mutex::new(Some(transport)),
            closed: AtomicBool::new(false),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Copy of the active configuration.
    pub fn config(&self) -> PortConfig {
        self.config.read().clone()
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Serializable snapshot of this session.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            port_name: self.port_name.clone(),
            client_id: self.client_id.clone(),
            exclusive: self.exclusive,
            config: self.config(),
            stats: self.stats.snapshot(),
        }
    }

    /// Blocking write under the session mutex.
    pub(crate) fn write_chunk(&self, data: &[u8]) -> Result<usize> {
        let mut guard = self.transport.lock();
        let transport = guard.as_mut().ok_or(Error::PortClosed)?;

        match transport.write_bytes(data) {
            Ok(n) => {
                self.stats.record_sent(n);
                Ok(n)
            }
            Err(e) => {
                self.stats.record_error();
                Err(Error::Hardware(e))
            }
        }
    }

    /// Blocking read under the session mutex. An empty result means the
    /// driver timed out with nothing available. Non-empty chunks are fanned
    /// out to raw subscribers.
    pub(crate) fn read_chunk(&self, max_bytes: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; max_bytes];
        let n = {
            let mut guard = self.transport.lock();
            let transport = guard.as_mut().ok_or(Error::PortClosed)?;

            match transport.read_bytes(&mut buffer) {
                Ok(n) => n,
                Err(e) => {
                    self.stats.record_error();
                    return Err(Error::Hardware(e));
                }
            }
        };

        buffer.truncate(n);
        self.stats.record_received(n);
        if n > 0 {
            self.broadcast_chunk(&buffer);
        }
        Ok(buffer)
    }

    /// Re-apply line parameters and read timeout, then store the new
    /// configuration. On failure the driver's actual state is undefined;
    /// the stored configuration is left untouched and the error reported.
    pub(crate) fn apply_config(&self, config: PortConfig) -> Result<()> {
        let mut guard = self.transport.lock();
        let transport = guard.as_mut().ok_or(Error::PortClosed)?;

        transport.set_mode(&config)?;
        if !config.read_timeout.is_zero() {
            transport.set_read_timeout(config.read_timeout)?;
        }

        *self.config.write() = config;
        Ok(())
    }

    /// Discard buffered input data at the hardware level.
    pub(crate) fn flush_input(&self) -> Result<()> {
        let mut guard = self.transport.lock();
        let transport = guard.as_mut().ok_or(Error::PortClosed)?;
        transport.reset_input_buffer()?;
        Ok(())
    }

    /// Register a raw-chunk subscriber channel.
    pub(crate) fn add_subscriber(&self, tx: mpsc::Sender<Vec<u8>>) {
        self.subscribers.lock().push(tx);
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Non-blocking fan-out of a received chunk to every subscriber. A full
    /// buffer drops the chunk for that subscriber only; gone receivers are
    /// pruned.
    fn broadcast_chunk(&self, chunk: &[u8]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(chunk.to_vec()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.record_drop();
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Flag the session as closed. Returns false if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::SeqCst)
    }

    /// Drop all subscriber senders; receivers observe end-of-stream.
    pub(crate) fn close_subscribers(&self) {
        self.subscribers.lock().clear();
    }

    /// Release the transport handle. Best-effort for the hardware: the error
    /// is reported, but the handle is gone either way.
    pub(crate) fn close_transport(&self) -> Result<()> {
        if let Some(mut transport) = self.transport.lock().take() {
            transport.close()?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("port_name", &self.port_name)
            .field("client_id", &self.client_id)
            .field("exclusive", &self.exclusive)
            .field("closed", &self.is_closed())
            .finish()
    }
}
