//! Throughput benchmarks for Roomcast.
//!
//! These benchmarks measure the raw throughput of the codec, the room
//! directory and broadcast fan-out.

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use roomcast_core::{BroadcastRouter, RoomDirectory};
use roomcast_protocol::{codec, Event};
use roomcast_transport::{ConnectionId, Outbound, TransportError};
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Accepts every send without doing anything.
struct NullOutbound;

#[async_trait]
impl Outbound for NullOutbound {
    async fn send(&self, _to: &ConnectionId, _event: &Event) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&self, _to: &ConnectionId, _reason: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

fn router_with_members(room: i64, members: usize) -> BroadcastRouter {
    let router = BroadcastRouter::new(Arc::new(NullOutbound));
    for i in 0..members {
        let id = ConnectionId::new(format!("conn-{}", i));
        router.connect(id.clone());
        router.route(&id, Event::join(room, "bench"));
    }
    router
}

/// Benchmark event encoding.
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in [64usize, 1024, 65536] {
        let event = Event::message(1, "bench", "x".repeat(size));
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("json", size), &event, |b, event| {
            b.iter(|| codec::encode_json(black_box(event)))
        });
        group.bench_with_input(BenchmarkId::new("msgpack", size), &event, |b, event| {
            b.iter(|| codec::encode(black_box(event)))
        });
    }

    group.finish();
}

/// Benchmark event decoding.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    for size in [64usize, 1024, 65536] {
        let event = Event::message(1, "bench", "x".repeat(size));
        let json = codec::encode_json(&event).unwrap();
        let binary = codec::encode(&event).unwrap();

        group.throughput(Throughput::Bytes(json.len() as u64));
        group.bench_with_input(BenchmarkId::new("json", size), &json, |b, json| {
            b.iter(|| codec::decode_json(black_box(json)))
        });
        group.throughput(Throughput::Bytes(binary.len() as u64));
        group.bench_with_input(BenchmarkId::new("msgpack", size), &binary, |b, binary| {
            b.iter(|| codec::decode(black_box(binary)))
        });
    }

    group.finish();
}

/// Benchmark room directory operations.
fn bench_directory(c: &mut Criterion) {
    let mut group = c.benchmark_group("directory");

    group.bench_function("join_new_room", |b| {
        let directory = RoomDirectory::new();
        let mut i = 0i64;
        b.iter(|| {
            let conn = ConnectionId::new(format!("conn:{}", i));
            directory.join(i, &conn);
            i += 1;
        });
    });

    group.bench_function("join_leave", |b| {
        let directory = RoomDirectory::new();
        let conn = ConnectionId::new("conn-1");
        b.iter(|| {
            directory.join(black_box(7), &conn);
            directory.leave(black_box(7), &conn);
        });
    });

    group.bench_function("members_of_100", |b| {
        let directory = RoomDirectory::new();
        for i in 0..100 {
            directory.join(1, &ConnectionId::new(format!("conn-{}", i)));
        }
        b.iter(|| directory.members_of(black_box(1)));
    });

    group.finish();
}

/// Benchmark fan-out scenarios.
fn bench_fanout(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout");

    for size in [10usize, 100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let router = router_with_members(1, size);
            let origin = ConnectionId::new("conn-0");
            let event = Event::message(1, "bench", "x".repeat(64));

            b.iter(|| rt.block_on(router.handle(&origin, black_box(event.clone()))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_encode,
    bench_decode,
    bench_directory,
    bench_fanout,
);
criterion_main!(benches);
