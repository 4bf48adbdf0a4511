use criterion::{black_box, criterion_group, criterion_main, Criterion};
use portlink::{MockTransportFactory, PortConfig, SessionManager, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

fn bench_session_write(c: &mut Criterion) {
    let factory = Arc::new(MockTransportFactory::new());
    let manager = SessionManager::with_factory(
        false,
        PortConfig::default(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );
    let session = manager
        .open_port("BENCH0", PortConfig::default(), "bench", true)
        .unwrap();
    let payload = vec![0x55u8; 64];

    c.bench_function("session_write_64b", |b| {
        b.iter(|| {
            let n = manager
                .write("BENCH0", session.id(), black_box(&payload))
                .unwrap();
            black_box(n);
        })
    });
}

fn bench_validate_session(c: &mut Criterion) {
    let factory = Arc::new(MockTransportFactory::new());
    let manager = SessionManager::with_factory(
        false,
        PortConfig::default(),
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
    );
    let session = manager
        .open_port("BENCH0", PortConfig::default(), "bench", true)
        .unwrap();

    c.bench_function("validate_session", |b| {
        b.iter(|| {
            let s = manager
                .validate_session(black_box("BENCH0"), session.id())
                .unwrap();
            black_box(s.id());
        })
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default()
        .warm_up_time(Duration::from_millis(300))
        .measurement_time(Duration::from_secs(2));
    targets = bench_session_write, bench_validate_session
}
criterion_main!(benches);
