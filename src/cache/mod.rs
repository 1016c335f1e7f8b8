//! Bounded, cost-weighted cache over decompressed table data blocks
//! (§4.H). Keyed by the 12-byte pair `(extent_id: u64, offset: u32)` that
//! uniquely identifies a block within a row stream.
//!
//! This is a per-table cache: each opened table owns one, and it is
//! drained when the table is closed. A miss costs one
//! [`crate::stream::StreamClient::read`] plus a decompress; a hit costs a
//! lock-free concurrent map lookup and a clone of an `Arc`.
//!
//! Backed by [`quick_cache`], the same admission-based concurrent cache
//! the pack's other block-based LSM engine uses for this exact concern
//! (`quick_cache::sync::Cache` keyed on `(segment, offset)`, weighted by
//! decompressed block length). Eviction is approximate — quick_cache
//! samples candidates rather than tracking a strict LRU order — which is
//! the right trade for a per-table cache this size: admission-scan cost
//! stays O(1) regardless of how many blocks are resident.


use std::sync::Arc;

use quick_cache::Weighter;
use quick_cache::sync::Cache as QuickCache;

/// Key identifying one cached block: the extent it lives in and its byte
/// offset within that extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockCacheKey {
    pub extent_id: u64,
    pub offset: u32,
}

impl BlockCacheKey {
    pub fn new(extent_id: u64, offset: u32) -> Self {
        Self { extent_id, offset }
    }

    /// A 12-byte form suitable for hashing or external cache keys:
    /// big-endian `extent_id` followed by big-endian `offset`.
    pub fn to_bytes(self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[..8].copy_from_slice(&self.extent_id.to_be_bytes());
        out[8..].copy_from_slice(&self.offset.to_be_bytes());
        out
    }
}

type CachedBlock = Arc<Vec<u8>>;

#[derive(Clone)]
struct BlockWeighter;

impl Weighter<BlockCacheKey, CachedBlock> for BlockWeighter {
    fn weight(&self, _key: &BlockCacheKey, block: &CachedBlock) -> u64 {
        block.len() as u64
    }
}

/// A bounded, cost-weighted block cache. Cost is the decompressed byte
/// length of each cached block; `max_cost_bytes` is the admission budget.
pub struct BlockCache {
    data: QuickCache<BlockCacheKey, CachedBlock, BlockWeighter>,
    max_cost_bytes: u64,
}

impl BlockCache {
    /// `num_counters` sizes the cache's internal frequency sketch — the
    /// expected number of distinct blocks it will see, not a hard cap.
    pub fn new(max_cost_bytes: usize, num_counters: u64) -> Self {
        use quick_cache::sync::DefaultLifecycle;

        let data = QuickCache::with(
            num_counters as usize,
            max_cost_bytes as u64,
            BlockWeighter,
            Default::default(),
            DefaultLifecycle::default(),
        );
        Self {
            data,
            max_cost_bytes: max_cost_bytes as u64,
        }
    }

    /// Default-sized cache: ~1 GiB budget, 1e7 counters, matching §4.B's
    /// per-table default.
    pub fn with_defaults() -> Self {
        Self::new(1024 * 1024 * 1024, 10_000_000)
    }

    /// Returns the cached block bytes, if present.
    pub fn get(&self, key: BlockCacheKey) -> Option<Arc<Vec<u8>>> {
        self.data.get(&key)
    }

    /// Inserts decompressed block bytes. quick_cache admits or evicts
    /// according to its own policy once the weighted budget is exceeded.
    pub fn insert(&self, key: BlockCacheKey, bytes: Arc<Vec<u8>>) {
        self.data.insert(key, bytes);
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_cost(&self) -> u64 {
        self.data.weight()
    }

    pub fn max_cost_bytes(&self) -> u64 {
        self.max_cost_bytes
    }

    /// Drops every cached entry. Called when a table is closed.
    pub fn clear(&self) {
        self.data.clear();
    }
}
