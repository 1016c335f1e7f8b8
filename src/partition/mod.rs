//! The range-partition engine (§4.F): the component that ties the block
//! codec, table reader/builder/iterators, memtable, and manifest together
//! into durable puts/deletes, point reads, range scans, flush, compaction,
//! and log-extent garbage collection.
//!
//! A partition owns three streams — a write-ahead log stream, a row stream
//! holding table blocks, and a meta stream holding manifest records — plus
//! an in-memory mutable memtable, a queue of sealed (immutable) memtables
//! awaiting flush, and the live table set. All three streams are consumed
//! only through [`crate::stream::StreamClient`]; this module never assumes
//! anything about how extents are placed or replicated.

pub mod background;
pub mod manifest;
pub mod memtable;


use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::block::{self, META_DELETE, Payload, ValueStruct};
use crate::key::{self, key_with_ts};
use crate::stream::{StreamClient, StreamError};
use crate::table::iterator::TableIter;
use crate::table::{MergeIterator, Table, TableBuilder, TableError, TableIterator};
use crate::wire::{Location, Range};

pub use background::{BackgroundWorkers, Job};
pub use manifest::{ManifestState, PartitionManifest};
pub use memtable::{Memtable, MemtableIterator};

/// Errors raised by the range-partition engine.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("block error: {0}")]
    Block(#[from] crate::block::BlockError),

    #[error("encoding error: {0}")]
    Encoding(#[from] crate::encoding::EncodingError),

    /// A value pointer referenced a log block that no longer decodes to a
    /// plain inline value (corruption, or a logic error in the writer).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Tunable thresholds for one [`RangePartition`]: plain fields, constructed
/// as a literal.
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Mutable memtable size, in bytes, that triggers a rotation to the
    /// immutable queue.
    pub flush_threshold_bytes: usize,
    /// Values at or above this length are stored in the memtable as a
    /// value pointer into the log rather than inline.
    pub value_inline_threshold_bytes: usize,
    /// Target size of one table data block before `FinishBlock` is called.
    pub block_target_size_bytes: usize,
    /// Table count above which `compact` will consider selecting a run.
    pub compaction_table_count_threshold: usize,
    /// Maximum number of tables merged by one compaction.
    pub compaction_max_run: usize,
    /// Per-table block cache budget, in bytes.
    pub cache_max_cost_bytes: usize,
    /// Bloom filter false-positive rate used by new tables.
    pub bloom_false_positive_rate: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            flush_threshold_bytes: 4 * 1024 * 1024,
            value_inline_threshold_bytes: 1024,
            block_target_size_bytes: 4096,
            compaction_table_count_threshold: 4,
            compaction_max_run: 8,
            cache_max_cost_bytes: 1024 * 1024 * 1024,
            bloom_false_positive_rate: 0.01,
        }
    }
}

impl PartitionConfig {
    /// Small thresholds that exercise rotation/flush/compaction in unit
    /// tests without needing megabyte-scale fixtures.
    pub fn for_tests() -> Self {
        Self {
            flush_threshold_bytes: 2048,
            value_inline_threshold_bytes: 64,
            block_target_size_bytes: 256,
            compaction_table_count_threshold: 3,
            compaction_max_run: 4,
            cache_max_cost_bytes: 1024 * 1024,
            bloom_false_positive_rate: 0.01,
        }
    }
}

/// A memtable that has been rotated out of the write path and is waiting
/// to be flushed, paired with the log position recorded at the moment it
/// was sealed (becomes the flushed table's recovery cursor).
struct SealedMemtable {
    memtable: Memtable,
    sealed_vp: Location,
}

/// Owns one contiguous key range's durable state: the write-ahead log,
/// row, and meta streams, the memtable pipeline, and the live table set.
pub struct RangePartition {
    part_id: u64,
    log_stream: Arc<dyn StreamClient>,
    row_stream: Arc<dyn StreamClient>,
    meta_stream: Arc<dyn StreamClient>,
    range: RwLock<Range>,
    tables: RwLock<Vec<Arc<Table>>>,
    mutable: Mutex<Memtable>,
    immutable: Mutex<VecDeque<SealedMemtable>>,
    manifest: PartitionManifest,
    /// The appender's lock (§7): guards the sequence counter across the
    /// whole allocate-then-append step, so a failed append never advances
    /// it. See [`Self::append_log_record_allocating`].
    seq: Mutex<u64>,
    log_head: Mutex<Location>,
    config: PartitionConfig,
}

impl RangePartition {
    /// Opens a partition: replays the manifest to rebuild the table list,
    /// then replays the log stream from the newest table's recovery cursor
    /// forward to repopulate the memtable (§4.F "Crash recovery").
    #[instrument(skip(log_stream, row_stream, meta_stream, config), fields(part_id))]
    pub fn open(
        part_id: u64,
        log_stream: Arc<dyn StreamClient>,
        row_stream: Arc<dyn StreamClient>,
        meta_stream: Arc<dyn StreamClient>,
        range: Range,
        config: PartitionConfig,
    ) -> Result<Self, PartitionError> {
        let manifest = PartitionManifest::new(Arc::clone(&meta_stream));
        let state = manifest.replay()?;

        let mut tables = Vec::with_capacity(state.live_tables.len());
        let mut max_seq_num = 0u64;
        let mut max_vp = Location::default();
        for (loc, seq_num) in &state.live_tables {
            let table = Table::open(Arc::clone(&row_stream), *loc, config.cache_max_cost_bytes)?;
            max_seq_num = max_seq_num.max(*seq_num);
            let vp = table.vp_location();
            if (vp.extent_id, vp.offset) > (max_vp.extent_id, max_vp.offset) {
                max_vp = vp;
            }
            tables.push(Arc::new(table));
        }
        tables.sort_by(|a, b| b.seq_num().cmp(&a.seq_num()));

        let partition = Self {
            part_id,
            log_stream,
            row_stream,
            meta_stream,
            range: RwLock::new(range),
            tables: RwLock::new(tables),
            mutable: Mutex::new(Memtable::new()),
            immutable: Mutex::new(VecDeque::new()),
            manifest,
            seq: Mutex::new(max_seq_num),
            log_head: Mutex::new(max_vp),
            config,
        };

        let max_seq_seen = partition.replay_log(max_seq_num, max_vp)?;
        *partition.seq.lock().expect("sequence counter mutex poisoned") = max_seq_seen.max(max_seq_num);

        info!(
            part_id,
            tables = partition.tables.read().expect("table list rwlock poisoned").len(),
            seq = *partition.seq.lock().expect("sequence counter mutex poisoned"),
            "partition opened"
        );
        Ok(partition)
    }

    pub fn part_id(&self) -> u64 {
        self.part_id
    }

    pub fn range(&self) -> Range {
        self.range.read().expect("range rwlock poisoned").clone()
    }

    /// Replays every log record with `sequence > durable_seq`, starting
    /// from `(from.extent_id, from.offset)`, into the mutable memtable.
    /// Returns the highest sequence number observed.
    fn replay_log(&self, durable_seq: u64, from: Location) -> Result<u64, PartitionError> {
        let info = self.log_stream.stream_info();
        if info.extent_ids.is_empty() {
            return Ok(durable_seq);
        }
        let start_idx = info
            .extent_ids
            .iter()
            .position(|&e| e == from.extent_id)
            .unwrap_or(0);

        let mut max_seq_seen = durable_seq;
        let mut last_loc = from;
        let mut mutable = self.mutable.lock().expect("mutable memtable mutex poisoned");

        for (i, &extent_id) in info.extent_ids.iter().enumerate().skip(start_idx) {
            let mut offset = if i == start_idx && extent_id == from.extent_id {
                from.offset
            } else {
                0
            };
            loop {
                let read = match self.log_stream.read(extent_id, offset, 1) {
                    Ok(r) => r,
                    Err(StreamError::OffsetOutOfRange { .. }) => break,
                    Err(e) => return Err(e.into()),
                };
                let Some(raw) = read.blocks.first() else {
                    break;
                };
                let block_len = raw.len() as u32;
                let (stored_key, value) = block::decode_single_entry(raw)?;
                let seq = key::parse_ts(&stored_key);
                if seq > durable_seq {
                    let mem_value = self.memtable_value_for(value, extent_id, offset, block_len);
                    mutable.insert(stored_key, mem_value);
                    max_seq_seen = max_seq_seen.max(seq);
                }
                last_loc = Location {
                    extent_id,
                    offset: read.end_offset,
                };
                offset = read.end_offset;
            }
        }
        drop(mutable);
        *self.log_head.lock().expect("log head mutex poisoned") = last_loc;
        Ok(max_seq_seen)
    }

    /// Decides whether a value should live inline in the memtable or as a
    /// pointer back into the log, given where its log record landed.
    fn memtable_value_for(
        &self,
        value: ValueStruct,
        extent_id: u64,
        offset: u32,
        block_len: u32,
    ) -> ValueStruct {
        if value.is_delete() {
            return value;
        }
        match &value.payload {
            Payload::Inline(bytes) if bytes.len() >= self.config.value_inline_threshold_bytes => {
                ValueStruct::pointer(value.meta, extent_id, offset, block_len)
            }
            _ => value,
        }
    }

    /// Durable put: appends the log record, then updates the mutable
    /// memtable, rotating it to the immutable queue if it has grown past
    /// [`PartitionConfig::flush_threshold_bytes`].
    #[instrument(skip(self, value), fields(part_id = self.part_id))]
    pub fn write(&self, key: &[u8], value: Vec<u8>) -> Result<(), PartitionError> {
        self.write_internal(key, value, 0)
    }

    /// Durable delete: appends a tombstone log record with no payload.
    #[instrument(skip(self), fields(part_id = self.part_id))]
    pub fn delete(&self, key: &[u8]) -> Result<(), PartitionError> {
        self.write_internal(key, Vec::new(), META_DELETE)
    }

    /// Identical to [`Self::write`]/[`Self::delete`] except `on_ack` runs
    /// as soon as the log append is acknowledged, before the memtable
    /// insertion that immediately follows on this same thread (§4.F
    /// "WriteAsync").
    pub fn write_async(
        &self,
        key: &[u8],
        value: Vec<u8>,
        meta: u8,
        on_ack: impl FnOnce(Result<(), PartitionError>),
    ) -> Result<(), PartitionError> {
        match self.append_log_record_allocating(key, value, meta) {
            Ok((stored_key, mem_value, _loc, _seq)) => {
                on_ack(Ok(()));
                self.install(stored_key, mem_value)
            }
            Err(err) => {
                let reported = PartitionError::Internal(err.to_string());
                on_ack(Err(reported));
                Err(err)
            }
        }
    }

    fn write_internal(&self, key: &[u8], value: Vec<u8>, meta: u8) -> Result<(), PartitionError> {
        let (stored_key, mem_value, _loc, _seq) = self.append_log_record_allocating(key, value, meta)?;
        self.install(stored_key, mem_value)
    }

    /// Allocates the next sequence number and appends `(key, value)` as one
    /// log record at that sequence, holding `self.seq` — the appender's
    /// lock — for the whole allocate-then-append step. The candidate
    /// sequence is only committed back to the counter once the append
    /// succeeds; a surfaced append error leaves the counter untouched, so
    /// the next writer reuses the same number instead of observing a gap
    /// (§7 "Propagation policy").
    fn append_log_record_allocating(
        &self,
        key: &[u8],
        value: Vec<u8>,
        meta: u8,
    ) -> Result<(Vec<u8>, ValueStruct, Location, u64), PartitionError> {
        let mut seq_guard = self.seq.lock().expect("sequence counter mutex poisoned");
        let candidate = *seq_guard + 1;
        let (stored_key, mem_value, loc) = self.append_log_record(key, value, meta, candidate)?;
        *seq_guard = candidate;
        Ok((stored_key, mem_value, loc, candidate))
    }

    /// Appends one log record for `(key, value)` at `seq` and returns the
    /// stored key plus the `ValueStruct` the memtable should hold for it.
    /// Shared by the write path and GC relocation so both paths keep the
    /// same strictly-greater-than-original sequence guarantee. Callers
    /// that need the consume-only-on-success property use
    /// [`Self::append_log_record_allocating`] instead of calling this
    /// directly with a pre-allocated sequence.
    fn append_log_record(
        &self,
        key: &[u8],
        value: Vec<u8>,
        meta: u8,
        seq: u64,
    ) -> Result<(Vec<u8>, ValueStruct, Location), PartitionError> {
        let stored_key = key_with_ts(key, seq);
        let log_value = ValueStruct {
            meta,
            payload: Payload::Inline(value.clone()),
        };
        let block = block::encode_single_entry(&stored_key, &log_value);
        let block_len = block.len() as u32;
        let appended = self.log_stream.append(&[block], true)?;
        let record_loc = Location {
            extent_id: appended.extent_id,
            offset: appended.offsets[0],
        };
        *self.log_head.lock().expect("log head mutex poisoned") = Location {
            extent_id: appended.extent_id,
            offset: appended.end_offset,
        };

        let mem_value = if meta & META_DELETE != 0 {
            ValueStruct::inline(meta, Vec::new())
        } else if value.len() >= self.config.value_inline_threshold_bytes {
            ValueStruct::pointer(meta, record_loc.extent_id, record_loc.offset, block_len)
        } else {
            ValueStruct::inline(meta, value)
        };
        Ok((stored_key, mem_value, record_loc))
    }

    fn install(&self, stored_key: Vec<u8>, mem_value: ValueStruct) -> Result<(), PartitionError> {
        let should_flush = {
            let mut mutable = self.mutable.lock().expect("mutable memtable mutex poisoned");
            mutable.insert(stored_key, mem_value);
            mutable.estimated_size() >= self.config.flush_threshold_bytes
        };
        if should_flush {
            self.rotate_memtable();
        }
        Ok(())
    }

    /// Moves the mutable memtable to the immutable queue if it is
    /// non-empty, recording the current log head as its recovery cursor.
    fn rotate_memtable(&self) {
        let sealed_vp = *self.log_head.lock().expect("log head mutex poisoned");
        let sealed = {
            let mut mutable = self.mutable.lock().expect("mutable memtable mutex poisoned");
            std::mem::take(&mut *mutable)
        };
        if sealed.is_empty() {
            return;
        }
        let mut immutable = self.immutable.lock().expect("immutable queue mutex poisoned");
        let depth = immutable.len() + 1;
        immutable.push_back(SealedMemtable { memtable: sealed, sealed_vp });
        debug!(part_id = self.part_id, depth, "memtable rotated to immutable queue");
    }

    /// Point lookup. Returns `None` for a missing key or one shadowed by a
    /// delete tombstone (§4.F "Read").
    #[instrument(skip(self), fields(part_id = self.part_id))]
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, PartitionError> {
        if let Some(value) = self.lookup_current(key)? {
            return self.resolve(value);
        }
        Ok(None)
    }

    /// Finds the newest `ValueStruct` recorded for `key` across the
    /// mutable memtable, the immutable queue (newest first), and the
    /// table set (newest `seq_num` first, skipping tables whose bloom
    /// filter proves absence). Does not dereference value pointers.
    fn lookup_current(&self, key: &[u8]) -> Result<Option<ValueStruct>, PartitionError> {
        {
            let mutable = self.mutable.lock().expect("mutable memtable mutex poisoned");
            if let Some(v) = mutable.get(key) {
                return Ok(Some(v.clone()));
            }
        }
        {
            let immutable = self.immutable.lock().expect("immutable queue mutex poisoned");
            for sealed in immutable.iter().rev() {
                if let Some(v) = sealed.memtable.get(key) {
                    return Ok(Some(v.clone()));
                }
            }
        }
        let tables = self.tables.read().expect("table list rwlock poisoned");
        for table in tables.iter() {
            if table.does_not_have(key) {
                continue;
            }
            let mut it = TableIterator::new(Arc::clone(table));
            it.seek(&key_with_ts(key, u64::MAX))?;
            if it.valid() && key::parse_key(&it.key()) == key {
                return Ok(Some(it.value()));
            }
        }
        Ok(None)
    }

    /// Dereferences a value pointer (reading one log block) or returns the
    /// inline value directly; `None` for a delete tombstone.
    fn resolve(&self, value: ValueStruct) -> Result<Option<Vec<u8>>, PartitionError> {
        if value.is_delete() {
            return Ok(None);
        }
        match value.payload {
            Payload::Inline(bytes) => Ok(Some(bytes)),
            Payload::ValuePointer { extent_id, offset, .. } => {
                let read = self.log_stream.read(extent_id, offset, 1)?;
                let raw = read.blocks.first().ok_or_else(|| {
                    PartitionError::Internal(format!(
                        "value pointer ({extent_id}, {offset}) has no backing log block"
                    ))
                })?;
                let (_, resolved) = block::decode_single_entry(raw)?;
                match resolved.payload {
                    Payload::Inline(bytes) => Ok(Some(bytes)),
                    Payload::ValuePointer { .. } => Err(PartitionError::Internal(
                        "log record resolved to another value pointer".into(),
                    )),
                }
            }
        }
    }

    /// Range scan over `[start_key, end_key)`. An empty `end_key` means
    /// unbounded. Deleted keys are filtered out (§4.F "Range iteration").
    #[instrument(skip(self), fields(part_id = self.part_id))]
    pub fn scan(
        &self,
        start_key: &[u8],
        end_key: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, PartitionError> {
        let mutable = self.mutable.lock().expect("mutable memtable mutex poisoned");
        let immutable = self.immutable.lock().expect("immutable queue mutex poisoned");
        let tables = self.tables.read().expect("table list rwlock poisoned");

        let mut children: Vec<Box<dyn TableIter>> = Vec::new();
        children.push(Box::new(MemtableIterator::new(&mutable)));
        for sealed in immutable.iter().rev() {
            children.push(Box::new(MemtableIterator::new(&sealed.memtable)));
        }
        for table in tables.iter() {
            children.push(Box::new(TableIterator::new(Arc::clone(table))));
        }

        let mut merged = MergeIterator::new(children, false);
        merged.seek(&key_with_ts(start_key, u64::MAX))?;

        let mut out = Vec::new();
        let mut last_user_key: Option<Vec<u8>> = None;
        while merged.valid() {
            let stored_key = merged.key();
            let user_key = key::parse_key(&stored_key).to_vec();
            if !end_key.is_empty() && user_key.as_slice() >= end_key {
                break;
            }
            if last_user_key.as_deref() != Some(user_key.as_slice()) {
                let value = merged.value();
                last_user_key = Some(user_key.clone());
                if !value.is_delete() {
                    if let Some(bytes) = self.resolve(value)? {
                        out.push((user_key, bytes));
                    }
                }
            }
            merged.next()?;
        }
        Ok(out)
    }

    /// Flushes the oldest sealed memtable into a new table, if one is
    /// queued. Returns `false` when the immutable queue was empty.
    #[instrument(skip(self), fields(part_id = self.part_id))]
    pub fn flush_oldest_immutable(&self) -> Result<bool, PartitionError> {
        let sealed = {
            let mut immutable = self.immutable.lock().expect("immutable queue mutex poisoned");
            immutable.pop_front()
        };
        let Some(sealed) = sealed else {
            return Ok(false);
        };

        let discards = Self::compute_discards(&sealed.memtable);
        let estimated_size = sealed.memtable.estimated_size() as u64;
        let seq_num = sealed
            .memtable
            .iter()
            .map(|(k, _)| key::parse_ts(k))
            .max()
            .unwrap_or(0);

        let mut builder = TableBuilder::new(
            Arc::clone(&self.row_stream),
            self.config.block_target_size_bytes,
            sealed.memtable.len(),
            self.config.bloom_false_positive_rate,
        )?;
        for (stored_key, value) in sealed.memtable.iter() {
            builder.add(stored_key, value)?;
        }
        let loc = builder.finish_all(
            sealed.sealed_vp.extent_id,
            sealed.sealed_vp.offset,
            seq_num,
            discards,
            estimated_size,
        )?;

        self.manifest.append_add_table(loc, seq_num)?;
        let table = Table::open(Arc::clone(&self.row_stream), loc, self.config.cache_max_cost_bytes)?;
        {
            let mut tables = self.tables.write().expect("table list rwlock poisoned");
            tables.push(Arc::new(table));
            tables.sort_by(|a, b| b.seq_num().cmp(&a.seq_num()));
        }
        info!(part_id = self.part_id, extent_id = loc.extent_id, offset = loc.offset, seq_num, "flushed memtable");
        Ok(true)
    }

    /// Sums the sizes of value pointers that a sealed memtable's own
    /// history has already superseded — an older version of some user key
    /// that a newer write, still within this same memtable, shadowed
    /// before the pair ever reached a table (§4.F "Flush").
    fn compute_discards(memtable: &Memtable) -> HashMap<u64, i64> {
        let mut discards: HashMap<u64, i64> = HashMap::new();
        let mut seen_user_keys: std::collections::HashSet<Vec<u8>> = std::collections::HashSet::new();
        for (stored_key, value) in memtable.iter() {
            let user_key = key::parse_key(stored_key).to_vec();
            if !seen_user_keys.insert(user_key) {
                if let Payload::ValuePointer { extent_id, size, .. } = &value.payload {
                    *discards.entry(*extent_id).or_insert(0) += *size as i64;
                }
            }
        }
        discards
    }

    /// Merges overlapping tables inside `range` (an empty range means the
    /// whole partition) into one new table when the table count has grown
    /// past [`PartitionConfig::compaction_table_count_threshold`].
    #[instrument(skip(self), fields(part_id = self.part_id))]
    pub fn compact(&self, range: &Range) -> Result<bool, PartitionError> {
        let run = {
            let tables = self.tables.read().expect("table list rwlock poisoned");
            self.select_compaction_run(&tables, range)
        };
        let Some(run) = run else {
            return Ok(false);
        };

        let mut discards: HashMap<u64, i64> = HashMap::new();
        let mut max_seq = 0u64;
        let mut max_vp = Location::default();
        let mut estimated_size = 0u64;
        let mut children: Vec<Box<dyn TableIter>> = Vec::with_capacity(run.len());
        for table in &run {
            max_seq = max_seq.max(table.seq_num());
            let vp = table.vp_location();
            if (vp.extent_id, vp.offset) > (max_vp.extent_id, max_vp.offset) {
                max_vp = vp;
            }
            estimated_size += table.estimated_size();
            for (&extent_id, &amount) in table.discards() {
                *discards.entry(extent_id).or_insert(0) += amount;
            }
            children.push(Box::new(TableIterator::new(Arc::clone(table))));
        }

        let mut merged = MergeIterator::new(children, false);
        merged.rewind()?;
        let mut builder = TableBuilder::new(
            Arc::clone(&self.row_stream),
            self.config.block_target_size_bytes,
            0,
            self.config.bloom_false_positive_rate,
        )?;
        while merged.valid() {
            builder.add(&merged.key(), &merged.value())?;
            merged.next()?;
        }
        let new_loc = builder.finish_all(max_vp.extent_id, max_vp.offset, max_seq, discards, estimated_size)?;
        self.manifest.append_add_table(new_loc, max_seq)?;
        for table in &run {
            self.manifest.append_remove_table(table.loc())?;
        }

        let new_table = Table::open(Arc::clone(&self.row_stream), new_loc, self.config.cache_max_cost_bytes)?;
        {
            let mut tables = self.tables.write().expect("table list rwlock poisoned");
            let removed: Vec<Location> = run.iter().map(|t| t.loc()).collect();
            tables.retain(|t| !removed.contains(&t.loc()));
            tables.push(Arc::new(new_table));
            tables.sort_by(|a, b| b.seq_num().cmp(&a.seq_num()));
        }
        for table in &run {
            table.close();
        }
        info!(part_id = self.part_id, inputs = run.len(), extent_id = new_loc.extent_id, "compacted tables");
        Ok(true)
    }

    /// Picks a consecutive, overlapping run of tables intersecting
    /// `range`, oldest-first, capped at `compaction_max_run`.
    fn select_compaction_run(&self, tables: &[Arc<Table>], range: &Range) -> Option<Vec<Arc<Table>>> {
        if tables.len() < self.config.compaction_table_count_threshold {
            return None;
        }
        let overlaps = |t: &Arc<Table>| -> bool {
            let before_end = range.end_key.is_empty() || t.smallest() < range.end_key.as_slice();
            let after_start = range.start_key.is_empty() || t.biggest() >= range.start_key.as_slice();
            before_end && after_start
        };
        // `tables` is ordered newest (highest seq_num) first; compaction
        // favors the oldest tables first, so walk from the back.
        let mut candidates: Vec<Arc<Table>> = tables.iter().rev().filter(|t| overlaps(t)).cloned().collect();
        candidates.truncate(self.config.compaction_max_run.max(2));
        if candidates.len() < 2 {
            return None;
        }
        candidates.sort_by(|a, b| a.smallest().cmp(b.smallest()));
        Some(candidates)
    }

    /// Scans `target_extent_id` front-to-back, relocating every entry that
    /// is still live (or a tombstone) to the current log head with a fresh,
    /// strictly-greater sequence number, then emits a `ReleaseExtent`
    /// manifest record (§4.F "GC of log extents"). Reclaiming the bytes —
    /// decrementing the extent's refcount and, once it reaches zero,
    /// truncating it — is the stream manager's job; this method only ever
    /// signals intent through the manifest.
    #[instrument(skip(self), fields(part_id = self.part_id, target_extent_id))]
    pub fn run_gc(&self, target_extent_id: u64) -> Result<usize, PartitionError> {
        let mut offset = 0u32;
        let mut relocated = 0usize;
        loop {
            let read = match self.log_stream.read(target_extent_id, offset, 1) {
                Ok(r) => r,
                Err(StreamError::OffsetOutOfRange { .. }) => break,
                Err(StreamError::UnknownExtent(_)) => break,
                Err(e) => return Err(e.into()),
            };
            let Some(raw) = read.blocks.first() else {
                break;
            };
            let block_len = raw.len() as u32;
            let (stored_key, value) = block::decode_single_entry(raw)?;
            let user_key = key::parse_key(&stored_key).to_vec();
            let original_seq = key::parse_ts(&stored_key);

            let keep = if value.is_delete() {
                true
            } else {
                self.is_live(&user_key, target_extent_id, offset, block_len)?
            };

            if keep {
                let payload = match value.payload {
                    Payload::Inline(bytes) => bytes,
                    Payload::ValuePointer { .. } => {
                        return Err(PartitionError::Internal(
                            "log record payload was itself a value pointer".into(),
                        ));
                    }
                };
                let (new_stored_key, mem_value, _loc, new_seq) =
                    self.append_log_record_allocating(&user_key, payload, value.meta)?;
                debug_assert!(
                    new_seq > original_seq,
                    "GC relocation must use a strictly greater sequence than the original entry"
                );
                self.install(new_stored_key, mem_value)?;
                relocated += 1;
            }

            offset = read.end_offset;
        }

        self.manifest.append_release_extent(target_extent_id)?;
        info!(part_id = self.part_id, target_extent_id, relocated, "gc pass complete");
        Ok(relocated)
    }

    /// An entry at `(target_extent_id, offset)` is live iff the *current*
    /// value recorded for its user key (across memtable and tables) is a
    /// value pointer that still points at this exact log location — i.e.
    /// nothing newer has shadowed it.
    fn is_live(
        &self,
        user_key: &[u8],
        target_extent_id: u64,
        offset: u32,
        block_len: u32,
    ) -> Result<bool, PartitionError> {
        let Some(current) = self.lookup_current(user_key)? else {
            return Ok(false);
        };
        if current.is_delete() {
            return Ok(false);
        }
        match current.payload {
            Payload::ValuePointer {
                extent_id,
                offset: cur_offset,
                size,
            } => Ok(extent_id == target_extent_id && cur_offset == offset && size == block_len),
            Payload::Inline(_) => Ok(false),
        }
    }
}
