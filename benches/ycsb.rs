//! YCSB-style macro-benchmarks for the range-partition core.
//!
//! Measures sustained throughput under realistic mixed workloads inspired
//! by the Yahoo Cloud Serving Benchmark (YCSB).
//!
//! # Workloads
//!
//! | Name | Mix | Description |
//! |------|-----|-------------|
//! | **A** | 50% read, 50% update | Session store — heavy read/write |
//! | **B** | 95% read, 5% update | Photo tagging — read-mostly |
//! | **C** | 100% read | User profile cache — read-only |
//! | **D** | 95% read, 5% insert | Read-latest — status updates |
//! | **E** | 95% scan, 5% insert | Short ranges — threaded conversations |
//! | **F** | 50% read, 50% read-modify-write | User database — RMW |
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench ycsb               # all workloads
//! cargo bench --bench ycsb -- "load"      # load phase only
//! cargo bench --bench ycsb -- "A"         # workload A only
//! ```

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::Rng;

use aeternusdb::partition::{PartitionConfig, RangePartition};
use aeternusdb::stream::MockStreamClient;
use aeternusdb::wire::Range;

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Number of records loaded into the partition before running workloads.
const RECORD_COUNT: u64 = 10_000;

/// Number of operations per workload run.
const OPS_PER_RUN: u64 = 5_000;

/// Value size in bytes.
const VALUE_SIZE: usize = 256;

/// Scan length for workload E.
const SCAN_LENGTH: u64 = 50;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

fn make_key(i: u64) -> Vec<u8> {
    format!("user{i:012}").into_bytes()
}

fn make_value(rng: &mut impl Rng) -> Vec<u8> {
    let mut buf = vec![0u8; VALUE_SIZE];
    rng.fill(&mut buf[..]);
    buf
}

/// Opens a fresh, empty partition over in-memory streams, with a write
/// buffer tuned to trigger flushes partway through the load phase.
fn open_bench_partition() -> RangePartition {
    RangePartition::open(
        1,
        Arc::new(MockStreamClient::new()),
        Arc::new(MockStreamClient::new()),
        Arc::new(MockStreamClient::new()),
        Range { start_key: vec![], end_key: vec![] },
        PartitionConfig { flush_threshold_bytes: 256 * 1024, ..PartitionConfig::default() },
    )
    .expect("open")
}

/// Load phase: insert [`RECORD_COUNT`] sequential records.
///
/// **What it measures:** Sustained sequential write throughput through the
/// log-append + memtable path, including rotations triggered as the write
/// buffer fills up.
fn load_partition(partition: &RangePartition) {
    let mut rng = rand::rng();
    for i in 0..RECORD_COUNT {
        let key = make_key(i);
        let value = make_value(&mut rng);
        partition.write(&key, value).unwrap();
    }
}

// ------------------------------------------------------------------------------------------------
// Workloads
// ------------------------------------------------------------------------------------------------

/// Workload A — 50% read, 50% update. Session store: reads and refreshes
/// session state in roughly equal measure.
fn run_workload_a(partition: &RangePartition) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));
        if rng.random_bool(0.5) {
            let _ = black_box(partition.get(&key).unwrap());
        } else {
            partition.write(&key, make_value(&mut rng)).unwrap();
        }
    }
}

/// Workload B — 95% read, 5% update. Photo tagging: reads dominate, with
/// occasional metadata writes.
fn run_workload_b(partition: &RangePartition) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));
        if rng.random_bool(0.95) {
            let _ = black_box(partition.get(&key).unwrap());
        } else {
            partition.write(&key, make_value(&mut rng)).unwrap();
        }
    }
}

/// Workload C — 100% read. Profile cache: the theoretical ceiling for
/// point-read throughput with zero write contention.
fn run_workload_c(partition: &RangePartition) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));
        let _ = black_box(partition.get(&key).unwrap());
    }
}

/// Workload D — 95% read, 5% insert beyond the loaded range. Status feed:
/// most reads target existing keys while a trickle of inserts grows the
/// keyspace.
fn run_workload_d(partition: &RangePartition, insert_base: &mut u64) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        if rng.random_bool(0.95) {
            let key = make_key(rng.random_range(0..RECORD_COUNT + *insert_base));
            let _ = black_box(partition.get(&key).unwrap());
        } else {
            let key = make_key(RECORD_COUNT + *insert_base);
            partition.write(&key, make_value(&mut rng)).unwrap();
            *insert_base += 1;
        }
    }
}

/// Workload E — 95% scan of [`SCAN_LENGTH`] keys, 5% insert. Threaded
/// conversations: reading a thread scans a short range; posting inserts one
/// new entry.
fn run_workload_e(partition: &RangePartition, insert_base: &mut u64) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        if rng.random_bool(0.95) {
            let start_id = rng.random_range(0..RECORD_COUNT.saturating_sub(SCAN_LENGTH));
            let start = make_key(start_id);
            let end = make_key(start_id + SCAN_LENGTH);
            let _ = black_box(partition.scan(&start, &end).unwrap());
        } else {
            let key = make_key(RECORD_COUNT + *insert_base);
            partition.write(&key, make_value(&mut rng)).unwrap();
            *insert_base += 1;
        }
    }
}

/// Workload F — 50% read, 50% read-modify-write. User database with
/// counters: half the operations read-then-overwrite a record.
fn run_workload_f(partition: &RangePartition) {
    let mut rng = rand::rng();
    for _ in 0..OPS_PER_RUN {
        let key = make_key(rng.random_range(0..RECORD_COUNT));
        if rng.random_bool(0.5) {
            let _ = black_box(partition.get(&key).unwrap());
        } else {
            let _ = partition.get(&key).unwrap();
            partition.write(&key, make_value(&mut rng)).unwrap();
        }
    }
}

// ================================================================================================
// Criterion benchmark functions
// ================================================================================================

/// Time to insert [`RECORD_COUNT`] records into a fresh partition. Sample
/// size is reduced to 10 because each iteration builds an entire partition
/// from scratch.
fn bench_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/load");
    group.sample_size(10);
    group.bench_function(BenchmarkId::new("sequential", RECORD_COUNT), |b| {
        b.iter_batched(open_bench_partition, |partition| load_partition(&partition), BatchSize::PerIteration);
    });
    group.finish();
}

fn bench_workload_a(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("A_50read_50update", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                partition
            },
            |partition| run_workload_a(&partition),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_b(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("B_95read_5update", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                partition
            },
            |partition| run_workload_b(&partition),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_c(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("C_100read", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                partition
            },
            |partition| run_workload_c(&partition),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_d(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("D_95read_5insert", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                (partition, 0u64)
            },
            |(partition, mut insert_base)| run_workload_d(&partition, &mut insert_base),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_e(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("E_95scan_5insert", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                (partition, 0u64)
            },
            |(partition, mut insert_base)| run_workload_e(&partition, &mut insert_base),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

fn bench_workload_f(c: &mut Criterion) {
    let mut group = c.benchmark_group("ycsb/workload");
    group.sample_size(10);
    group.bench_function("F_50read_50rmw", |b| {
        b.iter_batched(
            || {
                let partition = open_bench_partition();
                load_partition(&partition);
                partition
            },
            |partition| run_workload_f(&partition),
            BatchSize::PerIteration,
        );
    });
    group.finish();
}

// ================================================================================================
// Group registration
// ================================================================================================

criterion_group!(
    benches,
    bench_load,
    bench_workload_a,
    bench_workload_b,
    bench_workload_c,
    bench_workload_d,
    bench_workload_e,
    bench_workload_f,
);

criterion_main!(benches);
