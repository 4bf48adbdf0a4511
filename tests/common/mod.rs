//! Shared test utilities for portlink integration tests.
//!
//! Builds session managers over mock transports so tests exercise the full
//! session layer without hardware.

#![allow(dead_code)]

use portlink::{MockTransportFactory, PortConfig, SessionManager, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

/// Port configuration with short timeouts suitable for tests.
pub fn test_config() -> PortConfig {
    PortConfig {
        read_timeout: Duration::from_millis(5),
        write_timeout: Duration::from_millis(100),
        ..Default::default()
    }
}

/// A manager over a plain mock factory, plus the factory for feeding data
/// and inspecting writes.
pub fn manager_with_mocks(shared: bool) -> (Arc<SessionManager>, Arc<MockTransportFactory>) {
    let factory = Arc::new(MockTransportFactory::new());
    let manager = Arc::new(SessionManager::with_factory(
        shared,
        test_config(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    ));
    (manager, factory)
}

/// A manager whose mock ports echo writes back on their read side.
pub fn manager_with_loopback() -> (Arc<SessionManager>, Arc<MockTransportFactory>) {
    let factory = Arc::new(MockTransportFactory::new().loopback());
    let manager = Arc::new(SessionManager::with_factory(
        false,
        test_config(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    ));
    (manager, factory)
}

/// Poll until `predicate` holds or the deadline passes.
pub fn wait_until(deadline: Duration, predicate: impl Fn() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    predicate()
}
