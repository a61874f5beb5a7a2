// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use criterion::{criterion_group, criterion_main, Criterion};
use raft_log::{Entry, EntryKind, Log};
use rand::RngCore;

fn append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    let payload_sizes = [128, 1_024, 16_000, 256_000];

    for size in payload_sizes {
        let folder = tempfile::tempdir().unwrap();
        let log = Log::open(folder.path(), "raft", 100_000, 256 * 1024 * 1024).unwrap();

        let mut rng = rand::thread_rng();
        let mut payload = vec![0u8; size];
        rng.fill_bytes(&mut payload);

        let mut index = 0u64;
        group.bench_function(format!("{size} bytes"), |b| {
            b.iter(|| {
                index += 1;
                log.append(Entry::new(index, 1, EntryKind::Command, index, &payload))
                    .unwrap();
            })
        });
    }
}

fn get_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    let folder = tempfile::tempdir().unwrap();
    let log = Log::open(folder.path(), "raft", 100_000, 256 * 1024 * 1024).unwrap();

    let mut rng = rand::thread_rng();
    let mut payload = vec![0u8; 1_024];
    rng.fill_bytes(&mut payload);

    for i in 1..=10_000u64 {
        log.append(Entry::new(i, 1, EntryKind::Command, i, &payload)).unwrap();
    }

    group.bench_function("1024 bytes (sequential)", |b| {
        let mut index = 0u64;
        b.iter(|| {
            index = (index % 10_000) + 1;
            log.get(index).unwrap().unwrap();
        })
    });
}

fn roll_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("roll");

    group.bench_function("roll every 100 entries", |b| {
        b.iter(|| {
            let folder = tempfile::tempdir().unwrap();
            let log = Log::open(folder.path(), "raft", 100, 64 * 1024).unwrap();
            for i in 1..=1_000u64 {
                log.append(Entry::new(i, 1, EntryKind::Command, i, b"x")).unwrap();
            }
        })
    });
}

criterion_group!(benches, append_throughput, get_throughput, roll_throughput);
criterion_main!(benches);
