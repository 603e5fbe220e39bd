//! Performance benchmarks for store replication.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use realm_sync::{
    BusConfig, Channel, FollowerStore, LeaderStore, MemoryBus, RealmConfig, Status, StatusValue,
    StoreOptions, StoreRegistry, UniversalStore, WireCodec,
};
use std::collections::BTreeMap;
use std::sync::Arc;

type Counts = BTreeMap<String, u64>;

fn counts(entries: usize) -> Counts {
    (0..entries).map(|i| (format!("key-{}", i), i as u64)).collect()
}

/// Benchmark one follower write replicated to N other followers
fn bench_follower_write_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("follower_write_fanout");

    for followers in [1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("followers", followers),
            &followers,
            |b, &n| {
                let bus = MemoryBus::new();
                let _leader = LeaderStore::new(
                    StoreOptions::leader("counts", counts(10)),
                    &RealmConfig::server(),
                    Some(bus.endpoint("server") as Arc<dyn Channel>),
                );
                let stores: Vec<Arc<FollowerStore<Counts>>> = (0..n)
                    .map(|i| {
                        FollowerStore::new(
                            StoreOptions::follower("counts", Counts::new()),
                            &RealmConfig::manager(),
                            Some(bus.endpoint(&format!("follower-{}", i)) as Arc<dyn Channel>),
                        )
                    })
                    .collect();
                bus.flush();

                let writer = &stores[0];
                let mut tick = 0u64;
                b.iter(|| {
                    tick += 1;
                    writer.update_state(Arc::new(move |state: &Counts| {
                        let mut next = state.clone();
                        next.insert("tick".to_string(), tick);
                        next
                    }));
                    black_box(bus.flush());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark leader broadcast with varying state sizes and wire codecs
fn bench_leader_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("leader_broadcast");

    for (label, codec) in [("json", WireCodec::Json), ("msgpack", WireCodec::MessagePack)] {
        for entries in [10, 1000] {
            group.bench_with_input(
                BenchmarkId::new(label, entries),
                &entries,
                |b, &size| {
                    let bus = MemoryBus::with_config(BusConfig {
                        codec,
                        ..Default::default()
                    });
                    let leader = LeaderStore::new(
                        StoreOptions::leader("counts", counts(size)),
                        &RealmConfig::server(),
                        Some(bus.endpoint("server") as Arc<dyn Channel>),
                    );
                    let _follower = FollowerStore::new(
                        StoreOptions::follower("counts", Counts::new()),
                        &RealmConfig::preview(),
                        Some(bus.endpoint("preview") as Arc<dyn Channel>),
                    );
                    bus.flush();

                    let mut tick = 0u64;
                    b.iter(|| {
                        tick += 1;
                        leader.update_state(Arc::new(move |state: &Counts| {
                            let mut next = state.clone();
                            next.insert("key-0".to_string(), tick);
                            next
                        }));
                        black_box(bus.flush());
                    });
                },
            );
        }
    }

    group.finish();
}

/// Benchmark status batches set from a follower
fn bench_status_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_set");

    for batch in [10, 100, 1000] {
        group.bench_with_input(BenchmarkId::new("batch", batch), &batch, |b, &n| {
            let bus = MemoryBus::new();
            let server = StoreRegistry::with_channel(RealmConfig::server(), bus.endpoint("server"));
            let manager = StoreRegistry::with_channel(RealmConfig::manager(), bus.endpoint("manager"));
            let _leader = server.status_store().unwrap();
            let follower = manager.status_store().unwrap();
            bus.flush();

            let full = follower.full_status_store();
            let mut round = 0usize;
            b.iter(|| {
                round += 1;
                let value = if round % 2 == 0 {
                    StatusValue::Success
                } else {
                    StatusValue::Error
                };
                let statuses = (0..n)
                    .map(|i| Status::new(format!("story-{}", i), "vitest", value))
                    .collect();
                full.set(statuses);
                black_box(bus.flush());
            });
        });
    }

    group.finish();
}

/// Benchmark the local read path
fn bench_get_state(c: &mut Criterion) {
    let follower = FollowerStore::new(
        StoreOptions::follower("counts", counts(1000)),
        &RealmConfig::manager(),
        None,
    );

    c.bench_function("follower_get_state_1000", |b| {
        b.iter(|| {
            black_box(follower.get_state());
        });
    });
}

criterion_group!(
    benches,
    bench_follower_write_fanout,
    bench_leader_broadcast,
    bench_status_set,
    bench_get_state,
);

criterion_main!(benches);
