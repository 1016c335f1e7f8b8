//! Table reader — opens an immutable, sorted run of blocks persisted in a
//! row stream and exposes point lookups and block access (§4.B).
//!
//! A table is rooted at a single meta block: `(extent_id, offset)`. Opening
//! a table means reading that one block, verifying it, and decoding the
//! [`TableIndex`] it carries — every data block stays unread until a reader
//! actually asks for it.

pub mod builder;
pub mod concat;
pub mod iterator;
pub mod merge;


use std::sync::Arc;

use bloomfilter::Bloom;
use thiserror::Error;

use crate::block::{Block, BlockError, ValueStruct};
use crate::cache::{BlockCache, BlockCacheKey};
use crate::encoding::Decode;
use crate::stream::{StreamClient, StreamError};
use crate::wire::{Location, TableIndex};

pub use builder::TableBuilder;
pub use concat::ConcatIterator;
pub use iterator::TableIterator;
pub use merge::MergeIterator;

/// Errors raised opening or reading a table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("block error: {0}")]
    Block(#[from] BlockError),

    #[error("encoding error: {0}")]
    Encoding(#[from] crate::encoding::EncodingError),

    /// The meta block's payload was not a valid `TableIndex`.
    #[error("meta block decode failed: {0}")]
    MetaDecodeFailed(String),

    /// Bloom filter construction failed (builder side) or its stored bytes
    /// failed to parse (reader side, see [`TableError::BloomDecodeFailed`]).
    #[error("bloom filter build failed: {0}")]
    BloomBuildFailed(String),

    /// The bloom filter bytes stored in the meta block failed to decode.
    #[error("bloom filter decode failed: {0}")]
    BloomDecodeFailed(String),

    /// A table was opened with zero data blocks.
    #[error("table is empty")]
    EmptyTable,
}

/// An opened, immutable table: block index, bloom filter, and everything
/// needed for point lookups and range scans without re-reading the meta
/// block.
pub struct Table {
    stream: Arc<dyn StreamClient>,
    loc: Location,
    table_index: TableIndex,
    bloom: Option<Bloom<Vec<u8>>>,
    smallest: Vec<u8>,
    biggest: Vec<u8>,
    cache: BlockCache,
}

impl Table {
    /// Opens a table rooted at `loc`, reading and verifying its meta block.
    pub fn open(
        stream: Arc<dyn StreamClient>,
        loc: Location,
        cache_max_cost_bytes: usize,
    ) -> Result<Self, TableError> {
        let read = stream.read(loc.extent_id, loc.offset, 1)?;
        let raw = read
            .blocks
            .first()
            .ok_or(TableError::EmptyTable)?;

        let meta_block = Block::decode(raw)?;
        let (_, value) = meta_block.entry(0)?;
        let bytes = match &value.payload {
            crate::block::Payload::Inline(bytes) => bytes,
            crate::block::Payload::ValuePointer { .. } => {
                return Err(TableError::MetaDecodeFailed(
                    "meta block payload is a value pointer, expected inline bytes".into(),
                ));
            }
        };
        let (table_index, _) = TableIndex::decode_from(bytes)
            .map_err(|e| TableError::MetaDecodeFailed(e.to_string()))?;

        if table_index.block_index.is_empty() {
            return Err(TableError::EmptyTable);
        }

        let bloom = if table_index.bloom_filter.is_empty() {
            None
        } else {
            Some(
                Bloom::from_slice(&table_index.bloom_filter)
                    .map_err(|e| TableError::BloomDecodeFailed(e.to_string()))?,
            )
        };

        let smallest = table_index.block_index[0].key.clone();

        let cache = BlockCache::new(cache_max_cost_bytes, 10_000_000);
        let mut table = Self {
            stream,
            loc,
            table_index,
            bloom,
            smallest,
            biggest: Vec::new(),
            cache,
        };

        let last_idx = table.table_index.block_index.len() - 1;
        let last_block = table.block(last_idx)?;
        let biggest_idx = last_block
            .num_entries()
            .checked_sub(1)
            .ok_or(TableError::EmptyTable)?;
        let (biggest, _) = last_block.entry(biggest_idx)?;
        table.biggest = biggest;

        Ok(table)
    }

    pub fn loc(&self) -> Location {
        self.loc
    }

    pub fn smallest(&self) -> &[u8] {
        &self.smallest
    }

    pub fn biggest(&self) -> &[u8] {
        &self.biggest
    }

    pub fn num_blocks(&self) -> usize {
        self.table_index.block_index.len()
    }

    pub fn seq_num(&self) -> u64 {
        self.table_index.seq_num
    }

    pub fn vp_location(&self) -> Location {
        Location {
            extent_id: self.table_index.vp_extent_id,
            offset: self.table_index.vp_offset,
        }
    }

    pub fn estimated_size(&self) -> u64 {
        self.table_index.estimated_size
    }

    pub fn discards(&self) -> &std::collections::HashMap<u64, i64> {
        &self.table_index.discards
    }

    /// The middle block's first key — used as the split point by the
    /// stream-split transaction (§4.G).
    pub fn mid_key(&self) -> &[u8] {
        let mid = self.table_index.block_index.len() / 2;
        &self.table_index.block_index[mid].key
    }

    /// The extent holding this table's first data block — the oldest log
    /// extent this table could still reference.
    pub fn first_occurrence(&self) -> u64 {
        self.table_index.block_index[0].extent_id
    }

    /// `true` when the bloom filter proves `key` cannot be present. A
    /// `false` return means "maybe present" (or no bloom filter exists).
    ///
    /// `key` is the bare user key (no timestamp suffix) — the filter was
    /// built over user keys only (see [`builder::TableBuilder::add`]), since
    /// a lookup generally doesn't know in advance which version it wants.
    pub fn does_not_have(&self, key: &[u8]) -> bool {
        match &self.bloom {
            Some(bloom) => !bloom.check(key),
            None => false,
        }
    }

    /// The first key stored for block `idx`, as recorded in the block index
    /// (no I/O — this is metadata kept in memory since the table opened).
    pub fn block_index_key(&self, idx: usize) -> &[u8] {
        &self.table_index.block_index[idx].key
    }

    /// Loads (and caches) block `idx`.
    pub fn block(&self, idx: usize) -> Result<Block, TableError> {
        let entry = self
            .table_index
            .block_index
            .get(idx)
            .ok_or(TableError::EmptyTable)?;
        let cache_key = BlockCacheKey::new(entry.extent_id, entry.offset);

        if let Some(bytes) = self.cache.get(cache_key) {
            return Ok(Block::decode(&bytes)?);
        }

        let read = self.stream.read(entry.extent_id, entry.offset, 1)?;
        let raw = read.blocks.into_iter().next().ok_or(TableError::EmptyTable)?;
        self.cache.insert(cache_key, Arc::new(raw.clone()));
        Ok(Block::decode(&raw)?)
    }

    /// Reads the value a value-pointer refers to from the log stream.
    pub fn dereference_value_pointer(
        &self,
        log_stream: &dyn StreamClient,
        extent_id: u64,
        offset: u32,
    ) -> Result<ValueStruct, TableError> {
        let read = log_stream.read(extent_id, offset, 1)?;
        let raw = read.blocks.into_iter().next().ok_or(TableError::EmptyTable)?;
        let (_, value) = crate::block::decode_single_entry(&raw)?;
        Ok(value)
    }

    /// Drains this table's block cache. Called when the table is closed.
    pub fn close(&self) {
        self.cache.clear();
    }
}
