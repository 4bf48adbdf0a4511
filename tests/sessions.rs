//! Session lifecycle, locking, and registry integration tests.
//!
//! These drive the `SessionManager` over mock transports: open/validate/
//! close flows, exclusive vs shared locking, statistics bookkeeping, and
//! raw-chunk subscriptions.

mod common;

use common::{manager_with_loopback, manager_with_mocks, test_config};
use portlink::{Error, MockTransportFactory, PortConfig, SessionId, SessionManager, TransportFactory};
use pretty_assertions::assert_eq;
use std::sync::Arc;

#[test]
fn open_then_validate_succeeds_with_issued_id_only() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();

    let validated = manager.validate_session("MOCK0", session.id()).unwrap();
    assert_eq!(validated.id(), session.id());
    assert_eq!(validated.client_id(), "client-a");

    assert!(matches!(
        manager.validate_session("MOCK0", SessionId::new_v4()),
        Err(Error::InvalidSession)
    ));
    assert!(matches!(
        manager.validate_session("MOCK1", session.id()),
        Err(Error::PortNotOpen)
    ));
}

#[test]
fn second_exclusive_open_fails_regardless_of_sharing() {
    // Sharing disabled: any second open is locked out.
    let (manager, _factory) = manager_with_mocks(false);
    manager
        .open_port("MOCK0", test_config(), "client-a", false)
        .unwrap();
    assert!(matches!(
        manager.open_port("MOCK0", test_config(), "client-b", false),
        Err(Error::PortLocked)
    ));

    // Sharing enabled: an exclusive request still loses to the holder...
    let (manager, _factory) = manager_with_mocks(true);
    manager
        .open_port("MOCK0", test_config(), "client-a", false)
        .unwrap();
    assert!(matches!(
        manager.open_port("MOCK0", test_config(), "client-b", true),
        Err(Error::PortLocked)
    ));

    // ...and an exclusive holder locks out everyone.
    let (manager, _factory) = manager_with_mocks(true);
    manager
        .open_port("MOCK1", test_config(), "client-a", true)
        .unwrap();
    assert!(matches!(
        manager.open_port("MOCK1", test_config(), "client-b", false),
        Err(Error::PortLocked)
    ));
}

#[test]
fn shared_sessions_keep_independent_bookkeeping() {
    let (manager, factory) = manager_with_mocks(true);

    let first = manager
        .open_port("MOCK0", test_config(), "client-a", false)
        .unwrap();
    let second = manager
        .open_port("MOCK0", test_config(), "client-b", false)
        .unwrap();
    assert_ne!(first.id(), second.id());

    manager.write("MOCK0", first.id(), b"from-a").unwrap();

    assert_eq!(first.stats().bytes_sent(), 6);
    assert_eq!(second.stats().bytes_sent(), 0);
    // Both sessions drive the same underlying stream.
    assert_eq!(factory.port("MOCK0").unwrap().write_log().len(), 1);

    // Closing one leaves the other fully operational.
    manager.close_port("MOCK0", first.id()).unwrap();
    assert!(matches!(
        manager.write("MOCK0", first.id(), b"stale"),
        Err(Error::InvalidSession)
    ));
    manager.write("MOCK0", second.id(), b"from-b").unwrap();
    assert_eq!(second.stats().bytes_sent(), 6);
}

#[test]
fn operations_after_close_never_succeed() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let stale = session.id();

    manager.close_port("MOCK0", stale).unwrap();

    assert!(matches!(
        manager.read("MOCK0", stale, 16),
        Err(Error::PortNotOpen)
    ));
    assert!(matches!(
        manager.write("MOCK0", stale, b"x"),
        Err(Error::PortNotOpen)
    ));
    assert!(matches!(
        manager.configure("MOCK0", stale, test_config()),
        Err(Error::PortNotOpen)
    ));

    // Another client reopens the same name; the stale id must not alias it.
    let reopened = manager
        .open_port("MOCK0", test_config(), "client-b", true)
        .unwrap();
    assert_ne!(reopened.id(), stale);
    assert!(matches!(
        manager.read("MOCK0", stale, 16),
        Err(Error::InvalidSession)
    ));
}

#[test]
fn close_with_wrong_id_leaves_session_intact() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();

    assert!(matches!(
        manager.close_port("MOCK0", SessionId::new_v4()),
        Err(Error::InvalidSession)
    ));
    assert!(matches!(
        manager.close_port("MOCK1", session.id()),
        Err(Error::PortNotOpen)
    ));

    // The rightful owner still holds a working session.
    manager.write("MOCK0", session.id(), b"ok").unwrap();
}

#[test]
fn open_failure_registers_nothing() {
    let factory = Arc::new(MockTransportFactory::with_ports(["MOCK0"]));
    let manager = SessionManager::with_factory(
        false,
        test_config(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );

    assert!(matches!(
        manager.open_port("MOCK9", test_config(), "client-a", true),
        Err(Error::PortNotFound)
    ));
    assert!(manager.list_open_ports().is_empty());
}

#[test]
fn empty_read_is_success_not_error() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();

    let data = manager.read("MOCK0", session.id(), 64).unwrap();
    assert!(data.is_empty());
    assert_eq!(session.stats().errors(), 0);
}

#[test]
fn read_and_write_update_statistics_monotonically() {
    let (manager, factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let port = factory.port("MOCK0").unwrap();

    manager.write("MOCK0", session.id(), b"12345").unwrap();
    assert_eq!(session.stats().bytes_sent(), 5);

    port.enqueue_read(b"abc");
    let data = manager.read("MOCK0", session.id(), 64).unwrap();
    assert_eq!(data, b"abc");
    assert_eq!(session.stats().bytes_received(), 3);

    port.enqueue_read(b"defg");
    manager.read("MOCK0", session.id(), 64).unwrap();
    assert_eq!(session.stats().bytes_received(), 7);

    let snapshot = session.stats().snapshot();
    assert_eq!(snapshot.bytes_sent, 5);
    assert_eq!(snapshot.bytes_received, 7);
    assert!(snapshot.last_activity >= snapshot.opened_at);
}

#[test]
fn hardware_errors_are_counted_and_returned_unchanged() {
    let (manager, factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let port = factory.port("MOCK0").unwrap();

    port.fail_next_read(portlink::PortError::config("receiver desync"));
    let err = manager.read("MOCK0", session.id(), 64).unwrap_err();
    assert!(matches!(err, Error::Hardware(_)));
    assert!(err.to_string().contains("receiver desync"));
    assert_eq!(session.stats().errors(), 1);

    port.fail_next_write(portlink::PortError::config("tx stuck"));
    assert!(manager.write("MOCK0", session.id(), b"x").is_err());
    assert_eq!(session.stats().errors(), 2);
}

#[test]
fn configure_roundtrip_keeps_config_and_reapplies_mode() {
    let (manager, factory) = manager_with_mocks(false);
    let config = test_config();
    let session = manager
        .open_port("MOCK0", config.clone(), "client-a", true)
        .unwrap();

    // Same parameters: no error, stored config unchanged.
    manager
        .configure("MOCK0", session.id(), config.clone())
        .unwrap();
    assert_eq!(session.config(), config);

    // New parameters reach the hardware and replace the stored config.
    let reconfigured = PortConfig {
        baud_rate: 115_200,
        ..config
    };
    manager
        .configure("MOCK0", session.id(), reconfigured.clone())
        .unwrap();
    assert_eq!(session.config(), reconfigured);

    let modes = factory.port("MOCK0").unwrap().applied_modes();
    assert_eq!(modes.len(), 2);
    assert_eq!(modes[1].baud_rate, 115_200);
}

#[test]
fn invalid_configure_is_rejected_before_hardware() {
    let (manager, factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();

    let bad = PortConfig {
        baud_rate: 0,
        ..test_config()
    };
    assert!(matches!(
        manager.configure("MOCK0", session.id(), bad),
        Err(Error::InvalidConfig(_))
    ));
    assert!(factory.port("MOCK0").unwrap().applied_modes().is_empty());
}

#[test]
fn flush_discards_buffered_input() {
    let (manager, factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let port = factory.port("MOCK0").unwrap();

    port.enqueue_read(b"stale bytes");
    manager.flush("MOCK0", session.id()).unwrap();

    assert!(port.was_input_reset());
    let data = manager.read("MOCK0", session.id(), 64).unwrap();
    assert!(data.is_empty());
}

#[test]
fn registry_queries_reflect_live_sessions() {
    let (manager, _factory) = manager_with_mocks(false);
    let a = manager
        .open_port("MOCK-B", test_config(), "client-a", true)
        .unwrap();
    let b = manager
        .open_port("MOCK-A", test_config(), "client-b", true)
        .unwrap();

    assert_eq!(manager.list_open_ports(), vec!["MOCK-A", "MOCK-B"]);
    assert_eq!(manager.get_session_by_id(a.id()).unwrap().port_name(), "MOCK-B");
    assert_eq!(manager.get_session("MOCK-A").unwrap().id(), b.id());

    let status = manager.get_status("MOCK-A").unwrap();
    assert_eq!(status.client_id, "client-b");
    assert!(status.exclusive);
    assert!(matches!(
        manager.get_status("MOCK-C"),
        Err(Error::PortNotOpen)
    ));
}

#[test]
fn close_all_tears_down_every_session() {
    let (manager, factory) = manager_with_mocks(false);
    let a = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let b = manager
        .open_port("MOCK1", test_config(), "client-b", true)
        .unwrap();

    // One transport failing to close must not stop the teardown.
    factory
        .port("MOCK0")
        .unwrap()
        .fail_close(portlink::PortError::config("stuck"));

    manager.close_all();

    assert!(manager.list_open_ports().is_empty());
    assert!(manager.get_session_by_id(a.id()).is_none());
    assert!(manager.get_session_by_id(b.id()).is_none());
    assert!(a.is_closed());
    assert!(b.is_closed());
}

#[test]
fn raw_subscribers_receive_read_chunks_until_close() {
    let (manager, factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    let port = factory.port("MOCK0").unwrap();

    let mut rx = manager.subscribe_to_reads("MOCK0", session.id()).unwrap();

    port.enqueue_read(b"chunk-1");
    let direct = manager.read("MOCK0", session.id(), 64).unwrap();
    assert_eq!(direct, b"chunk-1");
    assert_eq!(rx.try_recv().unwrap(), b"chunk-1");

    // Empty reads are not events.
    manager.read("MOCK0", session.id(), 64).unwrap();
    assert!(rx.try_recv().is_err());

    // Closing the session ends the stream gracefully.
    manager.close_port("MOCK0", session.id()).unwrap();
    assert!(matches!(
        rx.try_recv(),
        Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
    ));
}

#[test]
fn subscribing_to_a_stale_session_fails() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port("MOCK0", test_config(), "client-a", true)
        .unwrap();
    manager.close_port("MOCK0", session.id()).unwrap();

    assert!(matches!(
        manager.subscribe_to_reads("MOCK0", session.id()),
        Err(Error::PortNotOpen)
    ));
}

#[test]
fn open_with_defaults_uses_the_agent_config() {
    let (manager, _factory) = manager_with_mocks(false);
    let session = manager
        .open_port_with_defaults("MOCK0", "client-a", true)
        .unwrap();
    assert_eq!(session.config(), *manager.default_config());
}

#[test]
fn loopback_roundtrip_end_to_end() {
    let (manager, _factory) = manager_with_loopback();
    let session = manager
        .open_port("PORT-A", test_config(), "client-a", true)
        .unwrap();

    let written = manager.write("PORT-A", session.id(), b"hello").unwrap();
    assert_eq!(written, 5);

    let data = manager.read("PORT-A", session.id(), 256).unwrap();
    assert_eq!(data, b"hello");
    assert_eq!(session.stats().bytes_sent(), 5);
    assert_eq!(session.stats().bytes_received(), 5);
}
