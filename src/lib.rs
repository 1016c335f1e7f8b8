//! # AeternusDB
//!
//! The range-partition storage core of a distributed, log-structured
//! key-value engine. A partition owns a contiguous key range; its data
//! lives not in local files but across append-only **streams** of
//! **extents** reached through the [`stream::StreamClient`] trait, so the
//! same partition logic runs unmodified over local disk, a replicated log
//! service, or (in tests) an in-memory double.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      RangePartition                          │
//! │  ┌────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │  Mutable    │  │  Immutable   │  │  Tables              │  │
//! │  │  Memtable   │  │  Memtables   │  │  (block-indexed,     │  │
//! │  │  + log      │  │  (sealed)    │  │  bloom-filtered)     │  │
//! │  └─────┬───────┘  └──────┬───────┘  └──────────┬───────────┘  │
//! │        │   rotate        │   flush             │              │
//! │        └─────────►       └────────►            │              │
//! │                                                │              │
//! │  ┌─────────────────────────────────────────────┘              │
//! │  │  Compaction / GC over the log stream's extents            │
//! │  └─────────────────────────────────────────────────────────┘ │
//! │                                                              │
//! │  ┌───────────────────────────────────────────────────────┐  │
//! │  │      Manifest (append-only, replayed on open)         │  │
//! │  └───────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`block`] | The on-disk block codec shared by log records, manifest records, and table blocks |
//! | [`table`] | Immutable, sorted, block-indexed tables with bloom filters, and the iterator algebra over them |
//! | [`cache`] | Per-table block cache, keyed by `(extent_id, offset)` |
//! | [`stream`] | The `StreamClient` trait partitions read/write extents through, and its in-memory double |
//! | [`partition`] | The range-partition engine: memtable, flush, compaction, GC, crash recovery |
//! | [`manager`] | The split metadata transaction and its narrow transactional-KV/lease/id-allocator collaborators |
//! | [`wire`] | Wire types shared across the manifest and the manager's metadata records |
//! | [`key`] | User-key/timestamp encoding shared by memtables, tables, and iterators |
//! | [`encoding`] | The deterministic little-endian `Encode`/`Decode` traits everything above is framed with |
//!
//! ## Key Features
//!
//! - **Stream-backed durability** — every write is appended to a log
//!   stream before being acknowledged; [`partition::RangePartition::open`]
//!   replays the manifest and the log tail to reconstruct the last durable
//!   state.
//! - **Multi-version, timestamp-ordered keys** — point lookups and scans
//!   always see the latest committed version, respecting tombstones.
//! - **Value pointers** — values at or above
//!   [`partition::PartitionConfig::value_inline_threshold_bytes`] are
//!   stored once in the log and referenced by pointer from memtables and
//!   tables, instead of being copied into every table a compaction writes.
//! - **Bloom filter lookups** — each table carries a bloom filter over its
//!   user keys for fast negative point-lookup responses.
//! - **Block-level CRC32 integrity** — every block (log records, manifest
//!   records, table data/meta blocks) is checksummed.
//! - **Leader-gated range splits** — [`manager::split::multi_modify_split`]
//!   branches a partition in two by duplicating stream extent references
//!   under a compare-and-swap, without copying table or log data.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aeternusdb::partition::{PartitionConfig, RangePartition};
//! use aeternusdb::stream::{MockStreamClient, StreamClient};
//! use aeternusdb::wire::Range;
//!
//! let log: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
//! let row: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
//! let meta: Arc<dyn StreamClient> = Arc::new(MockStreamClient::new());
//! let range = Range { start_key: vec![], end_key: vec![] };
//!
//! let partition = RangePartition::open(1, log, row, meta, range, PartitionConfig::default())
//!     .unwrap();
//!
//! partition.write(b"hello", b"world".to_vec()).unwrap();
//! assert_eq!(partition.get(b"hello").unwrap(), Some(b"world".to_vec()));
//!
//! partition.delete(b"hello").unwrap();
//! assert_eq!(partition.get(b"hello").unwrap(), None);
//!
//! partition.write(b"a", b"1".to_vec()).unwrap();
//! partition.write(b"b", b"2".to_vec()).unwrap();
//! let results = partition.scan(b"a", b"c").unwrap();
//! ```

#![allow(dead_code)]

pub mod block;
pub mod cache;
pub mod encoding;
pub mod key;
pub mod manager;
pub mod partition;
pub mod stream;
pub mod table;
pub mod wire;
