//! Serial port discovery and hot-plug watching.
//!
//! The scanner enumerates OS-visible ports, classifies them, tags the ones
//! currently locked by a session, and supports a polling watch loop that
//! reports only when the discovered set changes. Enumeration itself sits
//! behind the [`PortEnumerator`] trait so an OS-event-driven implementation
//! (or a test stub) can be substituted without touching anything else.

use crate::error::{Error, Result};
use crate::manager::SessionManager;
use crate::port::PortError;
use parking_lot::RwLock;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// Classification of a discovered serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    Unknown,
    Usb,
    Native,
    Bluetooth,
    Virtual,
}

impl std::fmt::Display for PortType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortType::Unknown => "Unknown",
            PortType::Usb => "USB",
            PortType::Native => "Native",
            PortType::Bluetooth => "Bluetooth",
            PortType::Virtual => "Virtual",
        };
        f.write_str(name)
    }
}

/// Discovery-time snapshot of one serial port. Recomputed on every scan,
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub description: String,
    pub hardware_id: String,
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
    pub vid: String,
    pub pid: String,
    pub port_type: PortType,
    pub is_open: bool,
    pub locked_by: String,
}

/// USB descriptor details reported by the enumerator.
#[derive(Debug, Clone, Default)]
pub struct UsbDetails {
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Raw port descriptor as reported by the OS enumerator, before
/// classification and filtering.
#[derive(Debug, Clone, Default)]
pub struct DetectedPort {
    pub name: String,
    pub usb: Option<UsbDetails>,
    /// Set when the enumerator itself identifies the port as Bluetooth.
    pub bluetooth: bool,
}

/// Source of the current port set.
pub trait PortEnumerator: Send + Sync {
    fn enumerate(&self) -> std::result::Result<Vec<DetectedPort>, PortError>;
}

/// Enumerates ports through `serialport::available_ports()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnumerator;

impl PortEnumerator for SystemEnumerator {
    fn enumerate(&self) -> std::result::Result<Vec<DetectedPort>, PortError> {
        let ports = serialport::available_ports().map_err(PortError::from)?;

        Ok(ports
            .into_iter()
            .map(|p| {
                let mut detected = DetectedPort {
                    name: p.port_name,
                    ..Default::default()
                };
                match p.port_type {
                    serialport::SerialPortType::UsbPort(info) => {
                        detected.usb = Some(UsbDetails {
                            vid: info.vid,
                            pid: info.pid,
                            serial_number: info.serial_number,
                            manufacturer: info.manufacturer,
                            product: info.product,
                        });
                    }
                    serialport::SerialPortType::BluetoothPort => detected.bluetooth = true,
                    serialport::SerialPortType::PciPort | serialport::SerialPortType::Unknown => {}
                }
                detected
            })
            .collect())
    }
}

/// Handle returned by [`Scanner::watch_ports`]; stopping it (or dropping it)
/// terminates the watch loop.
pub struct WatchHandle {
    stop: Option<oneshot::Sender<()>>,
}

impl WatchHandle {
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Discovers serial ports and watches for hot-plug changes.
pub struct Scanner {
    exclude_patterns: Vec<Regex>,
    cached: RwLock<Vec<PortInfo>>,
    manager: Option<Arc<SessionManager>>,
    enumerator: Box<dyn PortEnumerator>,
}

impl Scanner {
    /// Create a scanner using the system enumerator.
    ///
    /// `exclude_patterns` are regular expressions; any port whose name
    /// matches one is dropped from results. Attaching a manager lets scans
    /// report which ports are currently locked and by whom.
    pub fn new(
        exclude_patterns: &[String],
        manager: Option<Arc<SessionManager>>,
    ) -> Result<Self> {
        Self::with_enumerator(exclude_patterns, manager, Box::new(SystemEnumerator))
    }

    /// Create a scanner over a custom enumeration source.
    pub fn with_enumerator(
        exclude_patterns: &[String],
        manager: Option<Arc<SessionManager>>,
        enumerator: Box<dyn PortEnumerator>,
    ) -> Result<Self> {
        let mut patterns = Vec::with_capacity(exclude_patterns.len());
        for pattern in exclude_patterns {
            let re = Regex::new(pattern)
                .map_err(|e| Error::InvalidConfig(format!("bad exclude pattern: {e}")))?;
            patterns.push(re);
        }

        Ok(Self {
            exclude_patterns: patterns,
            cached: RwLock::new(Vec::new()),
            manager,
            enumerator,
        })
    }

    /// Discover all available serial ports.
    ///
    /// Results are sorted by name for deterministic output and cached as the
    /// last scan result.
    pub fn scan(&self) -> Result<Vec<PortInfo>> {
        let detected = self.enumerator.enumerate().map_err(Error::Hardware)?;

        let mut result: Vec<PortInfo> = detected
            .iter()
            .filter(|port| !self.is_excluded(&port.name))
            .map(|port| self.describe(port))
            .collect();

        result.sort_by(|a, b| a.name.cmp(&b.name));

        *self.cached.write() = result.clone();
        Ok(result)
    }

    /// The last cached scan result.
    pub fn cached(&self) -> Vec<PortInfo> {
        self.cached.read().clone()
    }

    /// Re-scan and return one port by name, reflecting live state.
    pub fn get_port(&self, name: &str) -> Result<PortInfo> {
        let ports = self.scan()?;
        ports
            .into_iter()
            .find(|p| p.name == name)
            .ok_or(Error::PortNotFound)
    }

    /// Start a polling watch loop.
    ///
    /// On each tick the port set is re-scanned and compared against the
    /// previous one; the callback runs only when the set changed (same
    /// names, same open flags; order-sensitive, both lists are sorted).
    /// A zero interval returns an inert handle. An event-driven enumerator
    /// can be substituted via [`PortEnumerator`] instead of polling.
    pub fn watch_ports<F>(self: Arc<Self>, interval: Duration, callback: F) -> WatchHandle
    where
        F: Fn(&[PortInfo]) + Send + Sync + 'static,
    {
        if interval.is_zero() {
            return WatchHandle { stop: None };
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let scanner = self;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick of a tokio interval is immediate; consume it so
            // the loop fires after one full period like a plain ticker.
            ticker.tick().await;

            let mut last: Vec<PortInfo> = Vec::new();

            loop {
                tokio::select! {
                    _ = &mut stop_rx => return,
                    _ = ticker.tick() => {
                        let ports = match scanner.scan() {
                            Ok(ports) => ports,
                            Err(e) => {
                                debug!(error = %e, "port scan failed, will retry");
                                continue;
                            }
                        };

                        if !ports_equal(&last, &ports) {
                            last = ports.clone();
                            callback(&ports);
                        }
                    }
                }
            }
        });

        WatchHandle {
            stop: Some(stop_tx),
        }
    }

    fn is_excluded(&self, name: &str) -> bool {
        self.exclude_patterns.iter().any(|re| re.is_match(name))
    }

    /// Build the discovery snapshot for one detected port.
    fn describe(&self, port: &DetectedPort) -> PortInfo {
        let usb = port.usb.as_ref();

        let mut info = PortInfo {
            name: port.name.clone(),
            description: String::new(),
            hardware_id: String::new(),
            manufacturer: usb
                .and_then(|u| u.manufacturer.clone())
                .unwrap_or_default(),
            product: usb.and_then(|u| u.product.clone()).unwrap_or_default(),
            serial_number: usb
                .and_then(|u| u.serial_number.clone())
                .unwrap_or_default(),
            vid: usb.map(|u| format!("{:04X}", u.vid)).unwrap_or_default(),
            pid: usb.map(|u| format!("{:04X}", u.pid)).unwrap_or_default(),
            port_type: classify(port),
            is_open: false,
            locked_by: String::new(),
        };

        if let Some(u) = usb {
            info.hardware_id = format!("USB\\VID_{:04X}&PID_{:04X}", u.vid, u.pid);
        }

        info.description = if !info.product.is_empty() {
            info.product.clone()
        } else if usb.is_some() {
            "USB Serial Device".to_string()
        } else {
            "Serial Port".to_string()
        };

        if let Some(manager) = &self.manager {
            if let Some(session) = manager.get_session(&port.name) {
                info.is_open = true;
                info.locked_by = session.client_id().to_string();
            }
        }

        info
    }
}

/// Determine the type of a detected port.
///
/// USB and Bluetooth flags come straight from the enumerator; beyond that,
/// classification is name-pattern matching that differs per operating
/// system.
fn classify(port: &DetectedPort) -> PortType {
    if port.usb.is_some() {
        return PortType::Usb;
    }
    if port.bluetooth {
        return PortType::Bluetooth;
    }

    let name = port.name.as_str();

    if cfg!(target_os = "windows") {
        let lower = name.to_ascii_lowercase();
        if lower.contains("bluetooth") || lower.contains("bth") {
            return PortType::Bluetooth;
        }
    }

    if cfg!(target_os = "linux") {
        if name.starts_with("/dev/rfcomm") {
            return PortType::Bluetooth;
        }
        if name.starts_with("/dev/pts/") || name.starts_with("/dev/pty") {
            return PortType::Virtual;
        }
    }

    if cfg!(target_os = "macos") && name.starts_with("/dev/") && name.contains("Bluetooth") {
        return PortType::Bluetooth;
    }

    PortType::Native
}

/// Cheap change detection between two sorted scan results.
fn ports_equal(a: &[PortInfo], b: &[PortInfo]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .all(|(x, y)| x.name == y.name && x.is_open == y.is_open)
}
