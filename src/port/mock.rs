//! Mock serial transport for testing.
//!
//! Provides a `MockSerialPort` that simulates serial port behavior without
//! requiring actual hardware, and a `MockTransportFactory` the session layer
//! can be built on in tests. Supports read queues, write logging, loopback
//! wiring and fault injection.

use super::error::PortError;
use super::traits::{PortConfig, SerialTransport, TransportFactory};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on how long an empty mock read simulates driver blocking.
/// Keeps tests fast even when a long read timeout is configured.
const MAX_SIMULATED_BLOCK: Duration = Duration::from_millis(20);

/// Inner state of the mock port, protected by a mutex for interior mutability.
#[derive(Debug)]
struct MockPortState {
    /// Queue of bytes to be returned by read operations.
    read_queue: VecDeque<u8>,
    /// Log of all bytes written to the port.
    write_log: Vec<Vec<u8>>,
    /// Errors to inject on upcoming reads.
    read_faults: VecDeque<PortError>,
    /// Errors to inject on upcoming writes.
    write_faults: VecDeque<PortError>,
    /// Error to report from close().
    close_fault: Option<PortError>,
    /// When set, written bytes are fed back into the read queue.
    loopback: bool,
    /// Log of every mode applied via set_mode.
    mode_log: Vec<PortConfig>,
    /// Currently configured driver read timeout.
    read_timeout: Duration,
    /// Whether the input buffer has been reset.
    input_reset: bool,
}

impl Default for MockPortState {
    fn default() -> Self {
        Self {
            read_queue: VecDeque::new(),
            write_log: Vec::new(),
            read_faults: VecDeque::new(),
            write_faults: VecDeque::new(),
            close_fault: None,
            loopback: false,
            mode_log: Vec::new(),
            read_timeout: Duration::from_secs(1),
            input_reset: false,
        }
    }
}

/// Mock serial transport for testing.
///
/// Clones share state, so a test can keep a handle while the session layer
/// owns the boxed transport:
///
/// ```
/// use portlink::port::{MockSerialPort, SerialTransport};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.enqueue_read(b"Hello");
///
/// let mut buffer = [0u8; 16];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(port.write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    /// The internal state, shared between clones.
    state: Arc<Mutex<MockPortState>>,
}

impl MockSerialPort {
    /// Create a new mock serial port with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MockPortState::default())),
        }
    }

    /// Create a mock port that echoes every write back on its read side.
    pub fn loopback(name: impl Into<String>) -> Self {
        let port = Self::new(name);
        port.state.lock().loopback = true;
        port
    }

    /// Enqueue bytes to be returned by subsequent read operations.
    pub fn enqueue_read(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Inject an error to be returned by the next read.
    pub fn fail_next_read(&self, err: PortError) {
        self.state.lock().read_faults.push_back(err);
    }

    /// Inject an error to be returned by the next write.
    pub fn fail_next_write(&self, err: PortError) {
        self.state.lock().write_faults.push_back(err);
    }

    /// Make close() report the given error.
    pub fn fail_close(&self, err: PortError) {
        self.state.lock().close_fault = Some(err);
    }

    /// Get a copy of all data written to the port.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Get every mode applied via set_mode, oldest first.
    pub fn applied_modes(&self) -> Vec<PortConfig> {
        self.state.lock().mode_log.clone()
    }

    /// Currently configured driver read timeout.
    pub fn read_timeout(&self) -> Duration {
        self.state.lock().read_timeout
    }

    /// Whether the input buffer has been reset since creation.
    pub fn was_input_reset(&self) -> bool {
        self.state.lock().input_reset
    }

    /// Number of bytes waiting to be read.
    pub fn available_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl SerialTransport for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.state.lock();

        if let Some(err) = state.write_faults.pop_front() {
            return Err(err);
        }

        state.write_log.push(data.to_vec());
        if state.loopback {
            state.read_queue.extend(data);
        }
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let block_for;
        {
            let mut state = self.state.lock();

            if let Some(err) = state.read_faults.pop_front() {
                return Err(err);
            }

            if !state.read_queue.is_empty() {
                let mut bytes_read = 0;
                for byte in buffer.iter_mut() {
                    match state.read_queue.pop_front() {
                        Some(queued) => {
                            *byte = queued;
                            bytes_read += 1;
                        }
                        None => break,
                    }
                }
                return Ok(bytes_read);
            }

            block_for = state.read_timeout.min(MAX_SIMULATED_BLOCK);
        }

        // Nothing queued: behave like a driver read timing out with no data.
        std::thread::sleep(block_for);
        Ok(0)
    }

    fn set_mode(&mut self, config: &PortConfig) -> Result<(), PortError> {
        self.state.lock().mode_log.push(config.clone());
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.state.lock().read_timeout = timeout;
        Ok(())
    }

    fn reset_input_buffer(&mut self) -> Result<(), PortError> {
        let mut state = self.state.lock();
        state.read_queue.clear();
        state.input_reset = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PortError> {
        match self.state.lock().close_fault.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Factory handing out [`MockSerialPort`] transports.
///
/// Every open for the same port name shares one mock state, mirroring the
/// way shared sessions on one port name drive the same hardware stream. The
/// factory keeps a handle to every port it created so tests can feed data
/// and inspect writes after the session layer took ownership.
#[derive(Default)]
pub struct MockTransportFactory {
    ports: Mutex<HashMap<String, MockSerialPort>>,
    /// When non-empty, only these names open successfully.
    known_ports: Option<Vec<String>>,
    /// When set, all ports are created in loopback mode.
    loopback: bool,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict openable ports to the given names; anything else reports
    /// `PortError::NotFound`.
    pub fn with_ports<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known_ports: Some(names.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    /// Create all ports in loopback mode (writes echo back on reads).
    pub fn loopback(mut self) -> Self {
        self.loopback = true;
        self
    }

    /// Get the shared handle for a port this factory created.
    pub fn port(&self, name: &str) -> Option<MockSerialPort> {
        self.ports.lock().get(name).cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfig,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        if let Some(known) = &self.known_ports {
            if !known.iter().any(|n| n == port_name) {
                return Err(PortError::not_found(port_name));
            }
        }

        let mut ports = self.ports.lock();
        let port = ports.entry(port_name.to_string()).or_insert_with(|| {
            if self.loopback {
                MockSerialPort::loopback(port_name)
            } else {
                MockSerialPort::new(port_name)
            }
        });
        let mut transport = port.clone();
        transport.set_read_timeout(config.read_timeout)?;
        Ok(Box::new(transport))
    }
}
