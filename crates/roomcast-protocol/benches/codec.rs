//! Codec benchmarks for roomcast-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use roomcast_protocol::{codec, Event};

fn sample_event(body_len: usize) -> Event {
    Event::message(42, "bench-user", "x".repeat(body_len))
}

fn bench_encode_small(c: &mut Criterion) {
    let event = sample_event(64);

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(64));
    group.bench_function("json_64B", |b| {
        b.iter(|| codec::encode_json(black_box(&event)))
    });
    group.bench_function("msgpack_64B", |b| b.iter(|| codec::encode(black_box(&event))));
    group.finish();
}

fn bench_decode_small(c: &mut Criterion) {
    let event = sample_event(64);
    let json = codec::encode_json(&event).unwrap();
    let binary = codec::encode(&event).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(json.len() as u64));
    group.bench_function("json_64B", |b| b.iter(|| codec::decode_json(black_box(&json))));
    group.throughput(Throughput::Bytes(binary.len() as u64));
    group.bench_function("msgpack_64B", |b| b.iter(|| codec::decode(black_box(&binary))));
    group.finish();
}

fn bench_legacy_fields(c: &mut Criterion) {
    let text = r#"{"type":"MESSAGE","roomNumber":42,"sender":"bench-user","message":"hello"}"#;

    c.bench_function("decode_json_legacy_fields", |b| {
        b.iter(|| codec::decode_json(black_box(text)).unwrap())
    });
}

criterion_group!(
    benches,
    bench_encode_small,
    bench_decode_small,
    bench_legacy_fields
);
criterion_main!(benches);
