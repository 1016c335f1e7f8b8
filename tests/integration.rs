//! Integration tests for the public `RangePartition`/`manager` surface.
//!
//! These tests exercise the full storage stack (log stream -> memtable ->
//! table -> compaction/GC) through `aeternusdb::partition` and the split
//! transaction through `aeternusdb::manager`, using the crate's in-memory
//! stream and KV doubles. No private items are referenced.
//!
//! ## Coverage areas
//! - **Lifecycle**: write, get, delete, crash recovery via re-`open`
//! - **Scan**: range queries, tombstone filtering, cross-memtable/table merges
//! - **Flush / compaction / GC**: background workers driving the partition
//!   to a steady state under sustained writes
//! - **Split**: branching a partition's range under the leader-gated
//!   transaction
//! - **Concurrency**: multiple writer threads against one partition

use std::sync::Arc;
use std::thread;

use aeternusdb::encoding::encode_to_vec;
use aeternusdb::manager::split::{multi_modify_split, SealedLengths, SplitOutcome};
use aeternusdb::manager::{ExtentLocks, MockLeaseHolder, MockTransactionalKV, SequentialIdAllocator};
use aeternusdb::partition::background::{BackgroundWorkers, Job};
use aeternusdb::partition::{PartitionConfig, RangePartition};
use aeternusdb::stream::{MockStreamClient, StreamClient};
use aeternusdb::wire::{ExtentInfo, PartitionMeta, Range, StreamInfo};

fn full_range() -> Range {
    Range { start_key: vec![], end_key: vec![] }
}

fn open_partition(config: PartitionConfig) -> Arc<RangePartition> {
    let log: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
    let row: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
    let meta: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
    Arc::new(RangePartition::open(1, log, row, meta, full_range(), config).unwrap())
}

fn key(i: u64) -> Vec<u8> {
    format!("key-{i:06}").into_bytes()
}

// ================================================================================================
// CRUD
// ================================================================================================

#[test]
fn write_then_get_round_trips() {
    let partition = open_partition(PartitionConfig::default());
    partition.write(b"hello", b"world".to_vec()).unwrap();
    assert_eq!(partition.get(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn get_on_missing_key_is_none() {
    let partition = open_partition(PartitionConfig::default());
    assert_eq!(partition.get(b"absent").unwrap(), None);
}

#[test]
fn delete_shadows_a_prior_write() {
    let partition = open_partition(PartitionConfig::default());
    partition.write(b"hello", b"world".to_vec()).unwrap();
    partition.delete(b"hello").unwrap();
    assert_eq!(partition.get(b"hello").unwrap(), None);
}

#[test]
fn overwrite_returns_latest_value() {
    let partition = open_partition(PartitionConfig::default());
    partition.write(b"k", b"v1".to_vec()).unwrap();
    partition.write(b"k", b"v2".to_vec()).unwrap();
    assert_eq!(partition.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn large_value_round_trips_through_a_pointer() {
    let mut config = PartitionConfig::for_tests();
    config.value_inline_threshold_bytes = 32;
    let partition = open_partition(config);
    let big = vec![0xAB; 4096];
    partition.write(b"big", big.clone()).unwrap();
    assert_eq!(partition.get(b"big").unwrap(), Some(big));
}

// ================================================================================================
// Scan
// ================================================================================================

#[test]
fn scan_returns_keys_in_range_sorted_and_excludes_deletes() {
    let partition = open_partition(PartitionConfig::default());
    for i in 0..10 {
        partition.write(&key(i), format!("v{i}").into_bytes()).unwrap();
    }
    partition.delete(&key(5)).unwrap();

    let results = partition.scan(&key(2), &key(8)).unwrap();
    let got: Vec<Vec<u8>> = results.iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(got, vec![key(2), key(3), key(4), key(6), key(7)]);
}

#[test]
fn scan_with_empty_bounds_is_unbounded() {
    let partition = open_partition(PartitionConfig::default());
    partition.write(b"a", b"1".to_vec()).unwrap();
    partition.write(b"b", b"2".to_vec()).unwrap();
    let results = partition.scan(b"", b"").unwrap();
    assert_eq!(results.len(), 2);
}

// ================================================================================================
// Flush / compaction / GC under sustained writes
// ================================================================================================

#[test]
fn sustained_writes_survive_background_flush_and_compaction() {
    let config = PartitionConfig::for_tests();
    let partition = open_partition(config);
    let workers = BackgroundWorkers::spawn(Arc::clone(&partition), 64);

    for i in 0..500u64 {
        partition.write(&key(i), vec![0xCD; 96]).unwrap();
    }
    workers.submit(Job::Flush).unwrap();
    workers.submit(Job::Flush).unwrap();
    workers.submit(Job::Compact(full_range())).unwrap();
    workers.shutdown();

    for i in 0..500u64 {
        assert_eq!(partition.get(&key(i)).unwrap(), Some(vec![0xCD; 96]), "key {i}");
    }
}

#[test]
fn reopen_after_writes_recovers_mutable_state_from_the_log() {
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
            PartitionConfig::for_tests(),
        )
        .unwrap();
        partition.write(b"a", b"1".to_vec()).unwrap();
        partition.write(b"b", b"2".to_vec()).unwrap();
        partition.delete(b"a").unwrap();
    }

    let reopened =
        RangePartition::open(1, log, row, meta, full_range(), PartitionConfig::for_tests()).unwrap();
    assert_eq!(reopened.get(b"a").unwrap(), None);
    assert_eq!(reopened.get(b"b").unwrap(), Some(b"2".to_vec()));
}

// ================================================================================================
// Concurrency
// ================================================================================================

#[test]
fn concurrent_writers_all_survive() {
    let partition = open_partition(PartitionConfig::for_tests());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let partition = Arc::clone(&partition);
            thread::spawn(move || {
                for i in 0..100u64 {
                    let k = format!("t{t}-{i:04}").into_bytes();
                    partition.write(&k, vec![t as u8; 16]).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for t in 0..4u64 {
        for i in 0..100u64 {
            let k = format!("t{t}-{i:04}").into_bytes();
            assert_eq!(partition.get(&k).unwrap(), Some(vec![t as u8; 16]));
        }
    }
}

// ================================================================================================
// Split
// ================================================================================================

#[test]
fn split_partitions_a_range_under_the_leader_gated_transaction() {
    let kv = MockTransactionalKV::new();
    let leases = MockLeaseHolder::new(true);
    let ids = SequentialIdAllocator::starting_at(100);
    let locks = ExtentLocks::new();

    let leader_value = b"member-a".to_vec();
    kv.put("LEADER/1", leader_value.clone());
    let owner_revision = kv.put("OWNER/1", b"owner".to_vec());

    let meta = PartitionMeta {
        part_id: 1,
        log_stream: 10,
        row_stream: 20,
        meta_stream: 30,
        rg: Range { start_key: b"a".to_vec(), end_key: b"z".to_vec() },
    };
    kv.put(&format!("PART/{}", meta.part_id), encode_to_vec(&meta).unwrap());

    for (stream_id, extent_ids) in [(10u64, vec![1000u64]), (20, vec![2000]), (30, vec![3000])] {
        kv.put(
            &format!("STREAM/{stream_id}"),
            encode_to_vec(&StreamInfo { stream_id, extent_ids: extent_ids.clone() }).unwrap(),
        );
        for extent_id in extent_ids {
            kv.put(
                &format!("EXTENT/{extent_id}"),
                encode_to_vec(&ExtentInfo {
                    extent_id,
                    refs: 1,
                    eversion: 0,
                    sealed_length: 0,
                    avali: true,
                    replicas: vec![1],
                    parity: vec![],
                })
                .unwrap(),
            );
        }
    }

    let outcome = multi_modify_split(
        &kv,
        &leases,
        &ids,
        &locks,
        1,
        b"m",
        SealedLengths { log: 4096, row: 8192, meta: 128 },
        "LEADER/1",
        &leader_value,
        "OWNER/1",
        owner_revision,
    )
    .unwrap();

    assert!(matches!(outcome, SplitOutcome::Applied { new_part_id: 103 }));
}
