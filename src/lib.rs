//! Portlink Agent Library
//!
//! Core functionality for the portlink serial port agent: port discovery,
//! session arbitration and lifecycle, blocking I/O with timeout semantics,
//! and continuous-read fan-out to subscribers. A network protocol layer is
//! expected to embed this crate and map remote calls onto the public
//! operations; no wire protocol lives here.
//!
//! # Modules
//!
//! - `config`: Agent configuration with TOML support
//! - `error`: Session-layer error taxonomy
//! - `manager`: Session registry and port operations
//! - `port`: Serial transport boundary (real hardware and mocks)
//! - `reader`: Continuous reading with subscriber fan-out, line reassembly
//! - `scanner`: Port discovery and hot-plug watching
//! - `session`: The live state of one open port
//! - `timeout`: Caller-side deadlines over blocking I/O

pub mod config;
pub mod error;
pub mod manager;
pub mod port;
pub mod reader;
pub mod scanner;
pub mod session;
pub mod timeout;

// Re-export commonly used types for convenience
pub use error::{Error, Result};
pub use manager::SessionManager;
pub use port::{
    DataBits, FlowControl, MockSerialPort, MockTransportFactory, Parity, PortConfig, PortError,
    SerialTransport, StopBits, SyncSerialPort, SystemTransportFactory, TransportFactory,
};
pub use reader::{ContinuousReader, DataEvent, LineReader, Subscription};
pub use scanner::{
    DetectedPort, PortEnumerator, PortInfo, PortType, Scanner, SystemEnumerator, UsbDetails,
    WatchHandle,
};
pub use session::{Session, SessionId, SessionStats, SessionStatus, StatsSnapshot};
pub use timeout::{read_with_timeout, write_with_timeout};

// Re-export config types
pub use config::{AgentConfig, ConfigError, ConfigLoader, ConfigResult};
