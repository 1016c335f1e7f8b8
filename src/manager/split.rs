//! The split metadata transaction (§4.G): branches a partition into two by
//! duplicating its three streams' extent references under a leader-gated
//! compare-and-swap, without copying a single byte of table or log data.
//!
//! The two-phase-commit continuations the original algorithm describes
//! (`onFailure` releases locks, `onSuccess` applies the in-memory mirror
//! then releases locks) are collected here into a [`SplitStaging`] builder
//! instead of literal closures — see the REDESIGN note this crate's design
//! ledger carries forward.

use tracing::{info, instrument, warn};

use crate::encoding::{decode_from_slice, encode_to_vec};
use crate::wire::{ExtentInfo, PartitionMeta, Range, StreamInfo};

use super::{extent_key, part_key, stream_key};
use super::{Cmp, ExtentLocks, IdAllocator, LeaseHolder, ManagerError, Op, TransactionalKV};

/// The sealed length, at the moment of the split, of each stream's
/// currently-open (not yet sealed) extent — the caller observes this from
/// the partition being split, since the manager itself never reads stream
/// contents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SealedLengths {
    pub log: u32,
    pub row: u32,
    pub meta: u32,
}

/// What `multi_modify_split` actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutcome {
    /// The transaction committed: `new_part_id` now owns `[mid_key, old_end)`.
    Applied { new_part_id: u64 },
    /// `mid_key` already lay outside the partition's current range — this
    /// call is a duplicate of one that already committed (§9 "idempotent").
    AlreadyApplied,
}

/// Accumulates the locked extent ids and staged KV ops across all three
/// stream duplications, releasing the locks exactly once regardless of how
/// the transaction concludes.
struct SplitStaging<'a> {
    locks: &'a ExtentLocks,
    locked_extents: Vec<u64>,
    ops: Vec<Op>,
}

impl<'a> SplitStaging<'a> {
    fn new(locks: &'a ExtentLocks) -> Self {
        Self {
            locks,
            locked_extents: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Locks every extent in `extent_ids` and stages `ops` for them. On a
    /// lock failure, every extent this staging run has already locked is
    /// released before the error propagates — mirroring "aborting previous
    /// locks on failure" (§4.G step 3).
    fn stage_stream(&mut self, extent_ids: &[u64], ops: Vec<Op>) -> Result<(), ManagerError> {
        if let Err(err) = self.locks.lock_all(extent_ids) {
            self.locks.release_all(&self.locked_extents);
            self.locked_extents.clear();
            return Err(err);
        }
        self.locked_extents.extend_from_slice(extent_ids);
        self.ops.extend(ops);
        Ok(())
    }

    /// The transaction committed: release the locks and hand back every
    /// staged op for the caller's record (there is no further in-memory
    /// mirror in this crate beyond the lock set itself).
    fn commit(self) -> Vec<Op> {
        self.locks.release_all(&self.locked_extents);
        self.ops
    }

    /// The transaction failed to submit or its guards were rejected:
    /// release the locks and discard every staged op.
    fn abort(self) {
        self.locks.release_all(&self.locked_extents);
    }
}

/// Duplicates `src_stream_id`'s extent list into a brand new stream
/// `dst_stream_id`, bumping `Eversion`/`Refs` on every extent and sealing
/// the currently-open tail extent at `sealed_len` if it was still open
/// (§4.G step 3).
fn duplicate_stream(
    kv: &dyn TransactionalKV,
    staging: &mut SplitStaging<'_>,
    src_stream_id: u64,
    dst_stream_id: u64,
    sealed_len: u32,
) -> Result<(), ManagerError> {
    let raw = kv
        .get(&stream_key(src_stream_id))?
        .ok_or_else(|| ManagerError::NotFound(stream_key(src_stream_id)))?;
    let (src_info, _) = decode_from_slice::<StreamInfo>(&raw.value)?;

    let mut ops = Vec::with_capacity(src_info.extent_ids.len() + 1);
    for (i, &extent_id) in src_info.extent_ids.iter().enumerate() {
        let raw = kv
            .get(&extent_key(extent_id))?
            .ok_or_else(|| ManagerError::NotFound(extent_key(extent_id)))?;
        let (mut extent, _) = decode_from_slice::<ExtentInfo>(&raw.value)?;

        extent.eversion += 1;
        extent.refs += 1;
        let is_last = i + 1 == src_info.extent_ids.len();
        if is_last && extent.avali {
            extent.sealed_length = sealed_len;
            extent.avali = false;
        }

        ops.push(Op::Put {
            key: extent_key(extent_id),
            value: encode_to_vec(&extent)?,
        });
    }

    let dst_info = StreamInfo {
        stream_id: dst_stream_id,
        extent_ids: src_info.extent_ids.clone(),
    };
    ops.push(Op::Put {
        key: stream_key(dst_stream_id),
        value: encode_to_vec(&dst_info)?,
    });

    staging.stage_stream(&src_info.extent_ids, ops)
}

/// Branches partition `part_id` in two at `mid_key`. `leader_key`/`leader_value`
/// identify the membership record the caller expects to still hold the
/// partition's lease; `owner_key`/`owner_revision` pin that record's
/// create-revision so a takeover invalidates any split still in flight.
#[instrument(skip(kv, leases, ids, locks), fields(part_id, new_part_id = tracing::field::Empty))]
#[allow(clippy::too_many_arguments)]
pub fn multi_modify_split(
    kv: &dyn TransactionalKV,
    leases: &dyn LeaseHolder,
    ids: &dyn IdAllocator,
    locks: &ExtentLocks,
    part_id: u64,
    mid_key: &[u8],
    sealed_lengths: SealedLengths,
    leader_key: &str,
    leader_value: &[u8],
    owner_key: &str,
    owner_revision: i64,
) -> Result<SplitOutcome, ManagerError> {
    if !leases.am_leader() {
        return Err(ManagerError::NotLeader);
    }

    let raw = kv
        .get(&part_key(part_id))?
        .ok_or_else(|| ManagerError::NotFound(part_key(part_id)))?;
    let (meta, _) = decode_from_slice::<PartitionMeta>(&raw.value)?;

    let before_start = !meta.rg.start_key.is_empty() && mid_key < meta.rg.start_key.as_slice();
    let at_or_after_end = !meta.rg.end_key.is_empty() && mid_key >= meta.rg.end_key.as_slice();
    if before_start || at_or_after_end {
        warn!(part_id, "split mid_key already outside partition range, treating as applied");
        return Ok(SplitOutcome::AlreadyApplied);
    }

    let start = ids.allocate(4);
    let new_log_stream = start;
    let new_row_stream = start + 1;
    let new_meta_stream = start + 2;
    let new_part_id = start + 3;
    tracing::Span::current().record("new_part_id", &new_part_id);

    let mut staging = SplitStaging::new(locks);
    let streams = [
        (meta.log_stream, new_log_stream, sealed_lengths.log),
        (meta.row_stream, new_row_stream, sealed_lengths.row),
        (meta.meta_stream, new_meta_stream, sealed_lengths.meta),
    ];
    for (src, dst, sealed_len) in streams {
        if let Err(err) = duplicate_stream(kv, &mut staging, src, dst, sealed_len) {
            staging.abort();
            return Err(err);
        }
    }

    let new_meta = PartitionMeta {
        part_id: new_part_id,
        log_stream: new_log_stream,
        row_stream: new_row_stream,
        meta_stream: new_meta_stream,
        rg: Range {
            start_key: mid_key.to_vec(),
            end_key: meta.rg.end_key.clone(),
        },
    };
    let updated_old_meta = PartitionMeta {
        rg: Range {
            start_key: meta.rg.start_key.clone(),
            end_key: mid_key.to_vec(),
        },
        ..meta
    };

    let new_part_op = Op::Put {
        key: part_key(new_part_id),
        value: encode_to_vec(&new_meta)?,
    };
    let updated_old_part_op = Op::Put {
        key: part_key(part_id),
        value: encode_to_vec(&updated_old_meta)?,
    };

    let mut ops = staging.ops.clone();
    ops.push(new_part_op);
    ops.push(updated_old_part_op);

    let compares = vec![
        Cmp::Value {
            key: leader_key.to_string(),
            value: leader_value.to_vec(),
        },
        Cmp::CreateRevision {
            key: owner_key.to_string(),
            revision: owner_revision,
        },
    ];

    let committed = kv.txn(&compares, &ops)?;
    if !committed {
        staging.abort();
        return Err(ManagerError::CompareFailed);
    }

    staging.commit();
    info!(part_id, new_part_id, "split committed");
    Ok(SplitOutcome::Applied { new_part_id })
}
