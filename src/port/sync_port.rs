//! Synchronous serial transport implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own
//! `SerialTransport` trait for dependency injection and testing.

use super::error::PortError;
use super::traits::{PortConfig, SerialTransport, TransportFactory};
use std::io::{Read, Write};
use std::time::Duration;

/// Synchronous serial transport wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// # Arguments
    /// * `port_name` - The system path to the serial port (e.g., "/dev/ttyUSB0" or "COM3")
    /// * `config` - Line parameters and timeouts for the port
    pub fn open(port_name: &str, config: &PortConfig) -> Result<Self, PortError> {
        let stop_bits: serialport::StopBits = config.stop_bits.try_into()?;
        let parity: serialport::Parity = config.parity.try_into()?;

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(config.flow_control.into())
            .timeout(config.read_timeout)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::from(e),
            })?;

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialTransport for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::from)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        match self.port.read(buffer) {
            Ok(n) => Ok(n),
            // Driver timeout with nothing buffered is a valid empty read.
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(PortError::from(e)),
        }
    }

    fn set_mode(&mut self, config: &PortConfig) -> Result<(), PortError> {
        let stop_bits: serialport::StopBits = config.stop_bits.try_into()?;
        let parity: serialport::Parity = config.parity.try_into()?;

        self.port.set_baud_rate(config.baud_rate)?;
        self.port.set_data_bits(config.data_bits.into())?;
        self.port.set_stop_bits(stop_bits)?;
        self.port.set_parity(parity)?;
        self.port.set_flow_control(config.flow_control.into())?;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port.set_timeout(timeout).map_err(PortError::from)
    }

    fn reset_input_buffer(&mut self) -> Result<(), PortError> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(PortError::from)
    }

    fn close(&mut self) -> Result<(), PortError> {
        // The OS handle is released when the port is dropped; flush what we
        // can so buffered output is not lost silently.
        self.port.flush().map_err(PortError::from)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

/// Factory opening real serial ports via [`SyncSerialPort`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTransportFactory;

impl TransportFactory for SystemTransportFactory {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfig,
    ) -> Result<Box<dyn SerialTransport>, PortError> {
        Ok(Box::new(SyncSerialPort::open(port_name, config)?))
    }
}
