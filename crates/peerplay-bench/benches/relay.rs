//! Relay benchmarks for PeerPlay.
//!
//! Registry bookkeeping and per-event fan-out, without network I/O.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use peerplay_bench::RoomFixture;
use peerplay_core::PresenceRegistry;
use peerplay_protocol::{InboundEvent, RoomPayload};
use peerplay_transport::ConnectionId;
use serde_json::json;

/// Benchmark registry operations.
fn bench_registry(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("join_leave", |b| {
        let registry = PresenceRegistry::new();
        let mut i = 0u64;
        b.iter(|| {
            let conn = ConnectionId::new(format!("conn:{}", i));
            i += 1;
            registry.join("room", &conn, "user");
            registry.leave(black_box(&conn))
        });
    });

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("snapshot", size), size, |b, &size| {
            let registry = PresenceRegistry::new();
            for i in 0..size {
                registry.join("room", &ConnectionId::new(format!("conn:{}", i)), "user");
            }
            b.iter(|| registry.snapshot(black_box("room")));
        });
    }

    group.finish();
}

/// Benchmark chat fan-out to the rest of a room.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for size in [2, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*size as u64 - 1));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut fixture = RoomFixture::new("room", size);
            let sender = fixture.peers[0].0.clone();
            let data = json!({"roomId": "room", "text": "x".repeat(64)});

            b.iter(|| {
                let event = InboundEvent::Chat(RoomPayload {
                    room_id: "room".to_string(),
                    data: data.clone(),
                });
                let dispatch = fixture.relay.handle(&sender, black_box(event));
                fixture.drain();
                dispatch
            });
        });
    }

    group.finish();
}

/// Benchmark a join into an occupied room, users_update broadcast included.
fn bench_join_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_broadcast");

    for size in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut fixture = RoomFixture::new("room", size);
            let joiner = fixture.peers[0].0.clone();

            b.iter(|| {
                // Re-join is idempotent, so the room size stays fixed.
                let event = InboundEvent::JoinRoom {
                    room_id: "room".to_string(),
                };
                let dispatch = fixture.relay.handle(&joiner, black_box(event));
                fixture.drain();
                dispatch
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_registry, bench_fanout, bench_join_broadcast);
criterion_main!(benches);
