//! Core traits for the serial transport boundary.
//!
//! Defines the `SerialTransport` trait that allows both real serial ports
//! and mock implementations to be used interchangeably, and the
//! `TransportFactory` trait through which the session layer opens ports.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration parameters for a serial port.
///
/// Immutable value type; validate with [`PortConfig::validate`] before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortConfig {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// Number of data bits (5, 6, 7, or 8).
    pub data_bits: DataBits,

    /// Number of stop bits.
    pub stop_bits: StopBits,

    /// Parity checking mode.
    pub parity: Parity,

    /// Flow control mode.
    pub flow_control: FlowControl,

    /// Driver-level read timeout. Zero means the driver default is kept.
    pub read_timeout: Duration,

    /// Write deadline used by caller-side timeout wrappers.
    pub write_timeout: Duration,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
        }
    }
}

impl PortConfig {
    /// Check that the configuration is usable.
    ///
    /// Returns the reason for rejection; the session layer wraps it into its
    /// own `InvalidConfig` error kind.
    pub fn validate(&self) -> Result<(), String> {
        if self.baud_rate == 0 {
            return Err(format!("invalid baud rate: {}", self.baud_rate));
        }
        Ok(())
    }
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    /// Convert a numeric bit count, rejecting values outside `[5, 8]`.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            5 => Some(Self::Five),
            6 => Some(Self::Six),
            7 => Some(Self::Seven),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, PortError> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            // The serialport backend has no 1.5 stop bit mode.
            StopBits::OnePointFive => Err(PortError::config(
                "1.5 stop bits are not supported by this backend",
            )),
        }
    }
}

/// Parity checking modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, PortError> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::config(
                "mark/space parity is not supported by this backend",
            )),
        }
    }
}

/// Flow control modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
            FlowControl::Software => serialport::FlowControl::Software,
        }
    }
}

/// Trait for serial transport I/O operations.
///
/// Abstracts over synchronous serial port operations so that both real
/// hardware ports and mock implementations can back a session. A handle is
/// exclusively owned by its session and only touched under the session's
/// mutex.
pub trait SerialTransport: Send + std::fmt::Debug {
    /// Write bytes to the port, returning the number actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the port into the provided buffer.
    ///
    /// Returns the number of bytes actually read. A driver-level timeout
    /// with nothing available is reported as `Ok(0)`, not an error.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Re-apply line parameters (baud rate, framing, flow control).
    fn set_mode(&mut self, config: &PortConfig) -> Result<(), PortError>;

    /// Set the driver-level read timeout.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), PortError>;

    /// Discard buffered input data.
    fn reset_input_buffer(&mut self) -> Result<(), PortError>;

    /// Release the port. The OS handle is also released on drop; an explicit
    /// close lets the backend report failures.
    fn close(&mut self) -> Result<(), PortError>;

    /// Get the name/path of this port.
    fn name(&self) -> &str;
}

/// Trait for opening serial transports.
///
/// The session layer never constructs a transport directly; it goes through
/// a factory so tests can inject mocks.
pub trait TransportFactory: Send + Sync {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfig,
    ) -> Result<Box<dyn SerialTransport>, PortError>;
}
