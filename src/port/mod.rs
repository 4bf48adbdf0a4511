//! Serial transport boundary.
//!
//! Provides the traits and implementations the session layer is built on,
//! enabling dependency injection and testing via mocks.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockSerialPort, MockTransportFactory};
pub use sync_port::{SyncSerialPort, SystemTransportFactory};
pub use traits::{
    DataBits, FlowControl, Parity, PortConfig, SerialTransport, StopBits, TransportFactory,
};
