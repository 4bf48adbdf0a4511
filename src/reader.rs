//! Continuous reading with subscriber fan-out.
//!
//! A [`ContinuousReader`] runs a per-session background loop that repeatedly
//! performs blocking reads through the manager and broadcasts each chunk to
//! every subscriber, so long-lived streaming consumers never monopolize the
//! manager's one-shot read path. [`LineReader`] reassembles delimiter-
//! terminated lines from a subscription's arbitrary chunk boundaries.

use crate::error::{Error, Result};
use crate::manager::SessionManager;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Default read chunk size when none is given.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default maximum line length for [`LineReader`].
pub const DEFAULT_MAX_LINE: usize = 4096;

/// Buffer capacity of an event subscriber channel. A subscriber this far
/// behind loses events (visible as sequence gaps) instead of stalling the
/// hardware read loop.
const EVENT_BUFFER: usize = 100;

/// Pause after a transient read error before the loop tries again.
const TRANSIENT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// One broadcast read event.
///
/// Sequence numbers increase strictly from 1 per reader; a gap tells a
/// subscriber that events were dropped for it, a decrease or repeat never
/// happens.
#[derive(Debug, Clone)]
pub struct DataEvent {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    pub sequence: u64,
    pub error: Option<Error>,
}

/// A subscriber's handle on a reader's event stream.
///
/// The channel closing (`recv` returning `None`) is the graceful
/// end-of-stream signal, not an error.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<DataEvent>,
}

impl Subscription {
    pub(crate) fn new(id: u64, rx: mpsc::Receiver<DataEvent>) -> Self {
        Self { id, rx }
    }

    /// Identifier to pass to [`ContinuousReader::unsubscribe`].
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next event; `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<DataEvent> {
        self.rx.recv().await
    }

    /// Blocking variant of [`recv`](Self::recv) for synchronous callers.
    pub fn blocking_recv(&mut self) -> Option<DataEvent> {
        self.rx.blocking_recv()
    }
}

/// State shared between the reader handle and its loop thread.
struct ReaderShared {
    subscribers: Mutex<Vec<(u64, mpsc::Sender<DataEvent>)>>,
    dropped: AtomicU64,
    next_subscriber_id: AtomicU64,
}

impl ReaderShared {
    fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    /// Non-blocking fan-out: a full subscriber loses this event (counted),
    /// a gone subscriber is pruned.
    fn broadcast(&self, event: DataEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(_, tx)| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Drop every subscriber sender; each receiver observes end-of-stream
    /// exactly once.
    fn close_subscribers(&self) {
        self.subscribers.lock().clear();
    }
}

/// Continuous reader for a session, broadcasting to subscribers.
///
/// A reader is one-shot: once stopped (explicitly or by a fatal stream
/// error) it cannot be restarted. Stopping is cooperative; an in-flight
/// blocking read is not interrupted, the loop exits when it returns.
pub struct ContinuousReader {
    manager: Arc<SessionManager>,
    port_name: String,
    session_id: SessionId,
    chunk_size: usize,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    shared: Arc<ReaderShared>,
}

impl ContinuousReader {
    /// Create a reader for a session. `chunk_size` of zero selects
    /// [`DEFAULT_CHUNK_SIZE`].
    pub fn new(
        manager: Arc<SessionManager>,
        port_name: impl Into<String>,
        session_id: SessionId,
        chunk_size: usize,
    ) -> Self {
        Self {
            manager,
            port_name: port_name.into(),
            session_id,
            chunk_size: if chunk_size == 0 {
                DEFAULT_CHUNK_SIZE
            } else {
                chunk_size
            },
            running: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
            shared: Arc::new(ReaderShared::new()),
        }
    }

    /// Begin continuous reading on a dedicated thread.
    ///
    /// A no-op if already running or already stopped. Fails if the session
    /// is not valid at start time.
    pub fn start(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) || self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self
            .manager
            .validate_session(&self.port_name, self.session_id)
        {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let manager = Arc::clone(&self.manager);
        let port_name = self.port_name.clone();
        let session_id = self.session_id;
        let chunk_size = self.chunk_size;
        let running = Arc::clone(&self.running);
        let stopped = Arc::clone(&self.stopped);
        let shared = Arc::clone(&self.shared);

        let spawned = std::thread::Builder::new()
            .name(format!("portlink-read-{}", self.port_name))
            .spawn(move || {
                read_loop(
                    manager, &port_name, session_id, chunk_size, running, stopped, shared,
                )
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(Error::Hardware(e.into()));
        }

        Ok(())
    }

    /// Stop the reader and close every subscriber channel.
    ///
    /// Idempotent no-op if not running. The loop thread exits after its
    /// current blocking read returns; it is not joined.
    pub fn stop(&self) {
        shut_down(&self.running, &self.stopped, &self.shared);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Total events dropped across all subscribers due to full buffers.
    pub fn events_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Register a new subscriber.
    ///
    /// On a reader that already ended, the returned subscription's channel
    /// is closed from the start.
    pub fn subscribe(&self) -> Subscription {
        let id = self
            .shared
            .next_subscriber_id
            .fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        if !self.stopped.load(Ordering::SeqCst) {
            self.shared.subscribers.lock().push((id, tx));
        }

        Subscription::new(id, rx)
    }

    /// Remove one subscriber; its channel closes, others are unaffected.
    pub fn unsubscribe(&self, subscription_id: u64) {
        self.shared
            .subscribers
            .lock()
            .retain(|(id, _)| *id != subscription_id);
    }
}

/// Flip the reader into its terminal state and release subscribers, exactly
/// once no matter how many callers race here.
fn shut_down(running: &AtomicBool, stopped: &AtomicBool, shared: &ReaderShared) {
    stopped.store(true, Ordering::SeqCst);
    if running.swap(false, Ordering::SeqCst) {
        shared.close_subscribers();
    }
}

fn read_loop(
    manager: Arc<SessionManager>,
    port_name: &str,
    session_id: SessionId,
    chunk_size: usize,
    running: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    shared: Arc<ReaderShared>,
) {
    let mut sequence: u64 = 0;

    while running.load(Ordering::SeqCst) {
        match manager.read(port_name, session_id, chunk_size) {
            // Timeout with nothing available is a non-event.
            Ok(data) if data.is_empty() => continue,
            Ok(data) => {
                sequence += 1;
                shared.broadcast(DataEvent {
                    data,
                    timestamp: Utc::now(),
                    sequence,
                    error: None,
                });
            }
            Err(err) => {
                sequence += 1;
                let fatal = err.ends_stream();
                shared.broadcast(DataEvent {
                    data: Vec::new(),
                    timestamp: Utc::now(),
                    sequence,
                    error: Some(err.clone()),
                });

                if fatal {
                    debug!(port = %port_name, error = %err, "read stream ended");
                    shut_down(&running, &stopped, &shared);
                    return;
                }

                trace!(port = %port_name, error = %err, "transient read error");
                std::thread::sleep(TRANSIENT_ERROR_BACKOFF);
            }
        }
    }
}

/// Reassembles delimiter-terminated lines from a subscription stream.
///
/// Chunk boundaries are arbitrary; a line may span many events or one event
/// may carry several lines. A line longer than the configured maximum is
/// returned as-is rather than growing the buffer without bound.
pub struct LineReader {
    delimiter: u8,
    max_line: usize,
    buffer: Vec<u8>,
}

impl LineReader {
    /// Create a line reader. `max_line` of zero selects
    /// [`DEFAULT_MAX_LINE`].
    pub fn new(delimiter: u8, max_line: usize) -> Self {
        Self {
            delimiter,
            max_line: if max_line == 0 {
                DEFAULT_MAX_LINE
            } else {
                max_line
            },
            buffer: Vec::new(),
        }
    }

    /// Read one complete line (delimiter stripped) from the subscription.
    ///
    /// When the stream ends, buffered partial data is returned as a final
    /// line; after that, `PortClosed`. An error event surfaces as that
    /// error.
    pub async fn read_line(&mut self, subscription: &mut Subscription) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = memchr::memchr(self.delimiter, &self.buffer) {
                let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
                line.pop();
                return Ok(line);
            }

            if self.buffer.len() > self.max_line {
                return Ok(std::mem::take(&mut self.buffer));
            }

            match subscription.recv().await {
                Some(event) => {
                    if let Some(err) = event.error {
                        return Err(err);
                    }
                    self.buffer.extend_from_slice(&event.data);
                }
                None => {
                    if self.buffer.is_empty() {
                        return Err(Error::PortClosed);
                    }
                    return Ok(std::mem::take(&mut self.buffer));
                }
            }
        }
    }
}
