//! Latency benchmarks for Roomcast.
//!
//! These benchmarks measure dispatch latency through real mailboxes,
//! including encoding and queueing.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use roomcast_core::BroadcastRouter;
use roomcast_protocol::{Encoding, Event};
use roomcast_transport::{ConnectionId, MailboxConfig, Mailboxes, Outgoing};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

/// Router with `members` connections in room 1, each with an open mailbox.
fn setup(members: usize, encoding: Encoding) -> (BroadcastRouter, Vec<mpsc::Receiver<Outgoing>>) {
    let mailboxes = Arc::new(Mailboxes::new(MailboxConfig {
        capacity: 1024,
        ..Default::default()
    }));
    let router = BroadcastRouter::new(mailboxes.clone());

    let receivers = (0..members)
        .map(|i| {
            let id = ConnectionId::new(format!("conn-{}", i));
            let rx = mailboxes.open(id.clone(), encoding);
            router.connect(id.clone());
            router.route(&id, Event::join(1, "bench"));
            rx
        })
        .collect();

    (router, receivers)
}

/// Benchmark message dispatch + receive latency.
fn bench_dispatch_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch_latency");

    for (name, members, encoding) in [
        ("single_member_json", 1, Encoding::Json),
        ("ten_members_json", 10, Encoding::Json),
        ("ten_members_msgpack", 10, Encoding::MessagePack),
    ] {
        group.bench_function(name, |b| {
            b.iter_custom(|iters| {
                let (router, mut receivers) = setup(members, encoding);
                let origin = ConnectionId::new("conn-0");

                let start = Instant::now();
                rt.block_on(async {
                    for _ in 0..iters {
                        router
                            .handle(&origin, Event::message(1, "bench", "hello"))
                            .await;
                        for rx in &mut receivers {
                            let _ = rx.try_recv();
                        }
                    }
                });
                start.elapsed()
            });
        });
    }

    group.finish();
}

/// Benchmark join/leave round trips through the router.
fn bench_membership_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (router, mut receivers) = setup(10, Encoding::Json);
    let id = ConnectionId::new("conn-0");

    c.bench_function("join_leave_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                router.handle(&id, black_box(Event::leave(1, "bench"))).await;
                router.handle(&id, black_box(Event::join(1, "bench"))).await;
            });
            for rx in &mut receivers {
                while rx.try_recv().is_ok() {}
            }
        })
    });
}

criterion_group!(benches, bench_dispatch_latency, bench_membership_latency);
criterion_main!(benches);
