//! Micro-benchmarks for the range-partition core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- get       # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use std::sync::Arc;

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use aeternusdb::partition::{PartitionConfig, RangePartition};
use aeternusdb::stream::{MockStreamClient, StreamClient};
use aeternusdb::wire::Range;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

const VALUE_128B: &[u8; 128] = &[0xAB; 128];
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

fn full_range() -> Range {
    Range { start_key: vec![], end_key: vec![] }
}

fn open_partition(config: PartitionConfig) -> RangePartition {
    RangePartition::open(
        1,
        Arc::new(MockStreamClient::new()),
        Arc::new(MockStreamClient::new()),
        Arc::new(MockStreamClient::new()),
        full_range(),
        config,
    )
    .expect("open")
}

/// A config whose flush threshold never trips during a single benchmark
/// iteration, isolating the log-append + memtable-insert path from flush.
fn memtable_only_config() -> PartitionConfig {
    PartitionConfig {
        flush_threshold_bytes: 64 * 1024 * 1024,
        ..PartitionConfig::default()
    }
}

fn prepopulated(count: u64, value: &[u8]) -> RangePartition {
    let partition = open_partition(memtable_only_config());
    for i in 0..count {
        partition.write(&make_key(i), value.to_vec()).unwrap();
    }
    partition
}

// ================================================================================================
// Write benchmarks
// ================================================================================================

/// `memtable_only/{128B,1K}` isolates the log-append + memtable-insert cost
/// from flush and compaction by using a flush threshold large enough that no
/// rotation happens during the benchmark.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for &(label, value) in &[("128B", VALUE_128B.as_slice()), ("1K", VALUE_1K.as_slice())] {
        group.bench_function(BenchmarkId::new("memtable_only", label), |b| {
            let partition = open_partition(memtable_only_config());
            let mut seq = 0u64;
            b.iter(|| {
                let key = make_key(seq);
                partition.write(black_box(&key), black_box(value.to_vec())).unwrap();
                seq += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Read benchmarks
// ================================================================================================

/// `memtable_hit`/`memtable_miss` measure the mutable-memtable lookup path;
/// `table_hit`/`table_miss` measure the same against data that has been
/// flushed out into a table, including the bloom filter probe.
fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");
    let n = 10_000u64;

    {
        let partition = prepopulated(n, VALUE_128B);
        group.bench_function("memtable_hit", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(i % n);
                let _ = black_box(partition.get(black_box(&key)).unwrap());
                i += 1;
            });
        });
        group.bench_function("memtable_miss", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(n + i);
                let _ = black_box(partition.get(black_box(&key)).unwrap());
                i += 1;
            });
        });
    }

    {
        let partition = prepopulated(n, VALUE_128B);
        partition.flush_oldest_immutable().unwrap();
        while partition.flush_oldest_immutable().unwrap() {}

        group.bench_function("table_hit", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(i % n);
                let _ = black_box(partition.get(black_box(&key)).unwrap());
                i += 1;
            });
        });
        group.bench_function("table_miss", |b| {
            let mut i = 0u64;
            b.iter(|| {
                let key = make_key(n + i);
                let _ = black_box(partition.get(black_box(&key)).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Scan benchmarks
// ================================================================================================

/// Scans of 10/100/1,000 keys out of a 10,000-key partition, measuring
/// throughput in elements/second via Criterion's element-throughput mode.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let n = 10_000u64;
    let partition = prepopulated(n, VALUE_128B);

    for &range_size in &[10u64, 100, 1000] {
        group.throughput(Throughput::Elements(range_size));
        group.bench_function(BenchmarkId::new("memtable", format!("{range_size}_keys")), |b| {
            let mut offset = 0u64;
            b.iter(|| {
                let start = make_key(offset % (n - range_size));
                let end = make_key(offset % (n - range_size) + range_size);
                let results = partition.scan(black_box(&start), black_box(&end)).unwrap();
                black_box(&results);
                offset += 1;
            });
        });
    }

    group.finish();
}

// ================================================================================================
// Flush and compaction benchmarks
// ================================================================================================

/// End-to-end flush (sealed memtable -> table) and compaction (K-way merge
/// of several tables into one) latency. Both rebuild their fixture per
/// iteration since each run consumes the state it measures.
fn bench_flush_and_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush_and_compact");
    group.sample_size(10);

    for &count in &[1_000u64, 5_000] {
        group.bench_function(BenchmarkId::new("flush", count), |b| {
            b.iter_batched(
                || {
                    let config = PartitionConfig { flush_threshold_bytes: 1, ..PartitionConfig::default() };
                    let partition = open_partition(config);
                    for i in 0..count {
                        partition.write(&make_key(i), VALUE_128B.to_vec()).unwrap();
                    }
                    partition
                },
                |partition| {
                    while black_box(partition.flush_oldest_immutable().unwrap()) {}
                },
                BatchSize::PerIteration,
            );
        });

        group.bench_function(BenchmarkId::new("compact", count), |b| {
            b.iter_batched(
                || {
                    let config = PartitionConfig::for_tests();
                    let partition = open_partition(config);
                    for i in 0..count {
                        partition.write(&make_key(i), VALUE_128B.to_vec()).unwrap();
                    }
                    while partition.flush_oldest_immutable().unwrap() {}
                    partition
                },
                |partition| {
                    while black_box(partition.compact(&full_range()).unwrap()) {}
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// Recovery benchmark
// ================================================================================================

/// Cold-start recovery: replaying the manifest and the log tail on
/// [`RangePartition::open`]. The count left un-flushed in the log
/// dominates this cost; the prepopulated data here stays entirely in the
/// log (no flush), so this measures worst-case log replay.
fn bench_recovery(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery");
    group.sample_size(10);

    for &count in &[1_000u64, 10_000] {
        group.bench_function(BenchmarkId::new("replay_log", count), |b| {
            b.iter_batched(
                || {
                    let log: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
                    let row: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
                    let meta: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
                    {
                        let partition = RangePartition::open(
                            1,
                            Arc::clone(&log),
                            Arc::clone(&row),
                            Arc::clone(&meta),
                            full_range(),
                            memtable_only_config(),
                        )
                        .unwrap();
                        for i in 0..count {
                            partition.write(&make_key(i), VALUE_128B.to_vec()).unwrap();
                        }
                    }
                    (log, row, meta)
                },
                |(log, row, meta)| {
                    let partition =
                        RangePartition::open(1, log, row, meta, full_range(), memtable_only_config())
                            .unwrap();
                    black_box(&partition);
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

// ================================================================================================
// Concurrent access benchmarks
// ================================================================================================

/// `RangePartition` is `Send + Sync` and meant to be shared via `Arc`.
/// `readers/{1,2,4}` measures point-read throughput scaling under
/// concurrent access to the same table set.
fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");
    group.sample_size(10);

    let reads_per_thread = 1_000u64;
    let n = 10_000u64;

    for &num_readers in &[1u32, 2, 4] {
        group.bench_function(BenchmarkId::new("readers", num_readers), |b| {
            b.iter_batched(
                || Arc::new(prepopulated(n, VALUE_128B)),
                |partition| {
                    let mut handles = Vec::new();
                    for t in 0..num_readers {
                        let partition = Arc::clone(&partition);
                        handles.push(std::thread::spawn(move || {
                            for i in 0..reads_per_thread {
                                let key = make_key((i + t as u64 * 1000) % n);
                                let _ = black_box(partition.get(&key).unwrap());
                            }
                        }));
                    }
                    for h in handles {
                        h.join().unwrap();
                    }
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_write,
    bench_get,
    bench_scan,
    bench_flush_and_compact,
    bench_recovery,
    bench_concurrent,
);

criterion_main!(benches);
