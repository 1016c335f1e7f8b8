//! The stream manager's narrow in-crate surface (§1, §6): a transactional
//! key-value store holding `PartitionMeta`/`StreamInfo`/`ExtentInfo`
//! records, a leader-lease check, and an id allocator — each a trait with
//! an in-memory mock, the same way [`crate::stream::StreamClient`] is a
//! trait this crate is built against rather than a service it ships.
//!
//! The one real algorithm living here is the split metadata transaction
//! (see [`split`]); everything else in this module is the minimal
//! collaborator surface that algorithm needs.

pub mod split;


use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;

use crate::encoding::EncodingError;

/// Errors raised by the manager's transactional KV, lease, and id-allocator
/// collaborators, and by the split transaction built on top of them.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// `MultiModifySplit` was called by a member that does not currently
    /// hold the partition's leader lease.
    #[error("not leader")]
    NotLeader,

    /// The owner key's create-revision no longer matches the revision the
    /// caller supplied — someone else has taken over ownership.
    #[error("revision stale: expected {expected}, found {found}")]
    RevisionStale { expected: i64, found: i64 },

    /// An extent the split needed to lock is already locked by another
    /// in-flight split.
    #[error("extent {0} is already locked by another split")]
    ExtentLocked(u64),

    /// A required KV key does not exist.
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The transactional KV's compare guards failed at submit time — a
    /// concurrent writer beat this transaction.
    #[error("transaction aborted: compare guard failed")]
    CompareFailed,

    /// Backend-specific failure not covered by the above.
    #[error("transactional KV backend error: {0}")]
    Backend(String),
}

/// One record as stored by a [`TransactionalKV`]: the raw bytes plus the
/// revisions etcd-style stores expose — `create_revision` never changes
/// once the key is first written, `mod_revision` bumps on every write.
#[derive(Debug, Clone)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub create_revision: i64,
    pub mod_revision: i64,
}

/// A guard evaluated atomically against the current KV state when a `txn`
/// is submitted. Both variants fail the whole transaction if not met.
#[derive(Debug, Clone)]
pub enum Cmp {
    /// `key`'s current value equals `value` exactly.
    Value { key: String, value: Vec<u8> },
    /// `key`'s create-revision equals `revision` — the way a lease/owner
    /// key is pinned so a transaction only applies while the same member
    /// still holds it.
    CreateRevision { key: String, revision: i64 },
}

/// One mutation staged as part of a `txn` call.
#[derive(Debug, Clone)]
pub enum Op {
    Put { key: String, value: Vec<u8> },
}

/// The transactional key-value store the split transaction reads
/// `PartitionMeta`/`StreamInfo`/`ExtentInfo` from and writes back to
/// (§6 "TransactionalKV").
pub trait TransactionalKV: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<KvEntry>, ManagerError>;

    /// Atomically evaluates every `compares` guard against the current
    /// state; if all hold, applies every `ops` mutation and returns `Ok(true)`.
    /// If any guard fails, applies nothing and returns `Ok(false)`.
    fn txn(&self, compares: &[Cmp], ops: &[Op]) -> Result<bool, ManagerError>;
}

/// An in-memory [`TransactionalKV`], analogous to the original
/// implementation's in-memory etcd stand-in.
#[derive(Default)]
pub struct MockTransactionalKV {
    inner: Mutex<HashMap<String, KvEntry>>,
    revision: AtomicI64,
}

impl MockTransactionalKV {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: seeds `key` with a fresh create-revision, returning it.
    pub fn put(&self, key: &str, value: Vec<u8>) -> i64 {
        let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let mut guard = self.inner.lock().expect("mock kv mutex poisoned");
        let create_revision = guard
            .get(key)
            .map(|e| e.create_revision)
            .unwrap_or(rev);
        guard.insert(
            key.to_string(),
            KvEntry {
                value,
                create_revision,
                mod_revision: rev,
            },
        );
        create_revision
    }
}

impl TransactionalKV for MockTransactionalKV {
    fn get(&self, key: &str) -> Result<Option<KvEntry>, ManagerError> {
        Ok(self
            .inner
            .lock()
            .expect("mock kv mutex poisoned")
            .get(key)
            .cloned())
    }

    fn txn(&self, compares: &[Cmp], ops: &[Op]) -> Result<bool, ManagerError> {
        let mut guard = self.inner.lock().expect("mock kv mutex poisoned");
        for cmp in compares {
            let ok = match cmp {
                Cmp::Value { key, value } => {
                    guard.get(key).map(|e| &e.value == value).unwrap_or(false)
                }
                Cmp::CreateRevision { key, revision } => guard
                    .get(key)
                    .map(|e| e.create_revision == *revision)
                    .unwrap_or(false),
            };
            if !ok {
                return Ok(false);
            }
        }

        for op in ops {
            match op {
                Op::Put { key, value } => {
                    let rev = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
                    let create_revision = guard
                        .get(key.as_str())
                        .map(|e| e.create_revision)
                        .unwrap_or(rev);
                    guard.insert(
                        key.clone(),
                        KvEntry {
                            value: value.clone(),
                            create_revision,
                            mod_revision: rev,
                        },
                    );
                }
            }
        }
        Ok(true)
    }
}

/// Stands in for a Raft/consensus leader-lease check (§1's out-of-scope
/// boundary: "real Raft leader election"). A real manager asks its
/// consensus layer; tests flip a flag.
pub trait LeaseHolder: Send + Sync {
    fn am_leader(&self) -> bool;
}

/// A [`LeaseHolder`] whose answer is set directly by the test.
pub struct MockLeaseHolder(AtomicBool);

impl MockLeaseHolder {
    pub fn new(is_leader: bool) -> Self {
        Self(AtomicBool::new(is_leader))
    }

    pub fn set_leader(&self, is_leader: bool) {
        self.0.store(is_leader, Ordering::SeqCst);
    }
}

impl LeaseHolder for MockLeaseHolder {
    fn am_leader(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Allocates contiguous blocks of ids for new partitions/streams — stands
/// in for whatever id-allocation service the real manager uses (§1's
/// out-of-scope data-placement service gets the same treatment).
pub trait IdAllocator: Send + Sync {
    /// Returns the first id of a contiguous block of `count` fresh ids.
    fn allocate(&self, count: u64) -> u64;
}

/// A process-local, strictly increasing [`IdAllocator`].
pub struct SequentialIdAllocator(AtomicU64);

impl SequentialIdAllocator {
    pub fn starting_at(first_id: u64) -> Self {
        Self(AtomicU64::new(first_id))
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn allocate(&self, count: u64) -> u64 {
        self.0.fetch_add(count, Ordering::SeqCst)
    }
}

/// Tracks extents currently locked by an in-flight split, so two splits
/// never touch the same extent concurrently (§5 "Shared-resource policy").
#[derive(Default)]
pub struct ExtentLocks {
    locked: Mutex<HashSet<u64>>,
}

impl ExtentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every id in `extent_ids`, or none of them: on the first
    /// already-locked id, every lock acquired so far in this call is
    /// released before returning the error.
    pub fn lock_all(&self, extent_ids: &[u64]) -> Result<(), ManagerError> {
        let mut guard = self.locked.lock().expect("extent locks mutex poisoned");
        let mut acquired = Vec::with_capacity(extent_ids.len());
        for &id in extent_ids {
            if !guard.insert(id) {
                for acquired_id in &acquired {
                    guard.remove(acquired_id);
                }
                return Err(ManagerError::ExtentLocked(id));
            }
            acquired.push(id);
        }
        Ok(())
    }

    pub fn release_all(&self, extent_ids: &[u64]) {
        let mut guard = self.locked.lock().expect("extent locks mutex poisoned");
        for id in extent_ids {
            guard.remove(id);
        }
    }
}

pub(crate) fn part_key(part_id: u64) -> String {
    format!("PART/{part_id}")
}

pub(crate) fn stream_key(stream_id: u64) -> String {
    format!("STREAM/{stream_id}")
}

pub(crate) fn extent_key(extent_id: u64) -> String {
    format!("EXTENT/{extent_id}")
}
