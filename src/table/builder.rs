//! Table builder — accumulates sorted `(key, value)` pairs into data
//! blocks, a bloom filter, and a final meta block (§4.C).

use std::collections::HashMap;
use std::sync::Arc;

use bloomfilter::Bloom;

use crate::block::{BlockBuilder, ValueStruct};
use crate::encoding::encode_to_vec;
use crate::stream::StreamClient;
use crate::wire::{BlockOffset, CompressionType, Location, TableIndex};

use super::TableError;

/// Builds one table by streaming `(key, value)` pairs in sorted order.
pub struct TableBuilder {
    stream: Arc<dyn StreamClient>,
    block_target_size_bytes: usize,
    current: BlockBuilder,
    block_index: Vec<BlockOffset>,
    bloom: Bloom<Vec<u8>>,
    key_count: u64,
}

impl TableBuilder {
    /// `expected_keys` sizes the bloom filter; it need not be exact, only a
    /// reasonable estimate (e.g. the sealed memtable's entry count).
    pub fn new(
        stream: Arc<dyn StreamClient>,
        block_target_size_bytes: usize,
        expected_keys: usize,
        bloom_false_positive_rate: f64,
    ) -> Result<Self, TableError> {
        let bloom = Bloom::new_for_fp_rate(expected_keys.max(1), bloom_false_positive_rate)
            .map_err(|e| TableError::BloomBuildFailed(e.to_string()))?;
        Ok(Self {
            stream,
            block_target_size_bytes,
            current: BlockBuilder::new(),
            block_index: Vec::new(),
            bloom,
            key_count: 0,
        })
    }

    /// Appends one entry. `key` must be greater than every previously
    /// added key (the caller is responsible for sort order).
    ///
    /// The bloom filter is built over the *user-key* portion only (the
    /// timestamp suffix stripped) so a point lookup that doesn't yet know
    /// which version it wants can still consult it — see
    /// [`super::Table::does_not_have`].
    pub fn add(&mut self, key: &[u8], value: &ValueStruct) -> Result<(), TableError> {
        self.bloom.set(&crate::key::parse_key(key).to_vec());
        self.key_count += 1;
        self.current.add(key, value);
        if self.current.estimated_size() >= self.block_target_size_bytes {
            self.finish_block()?;
        }
        Ok(())
    }

    fn finish_block(&mut self) -> Result<(), TableError> {
        if self.current.is_empty() {
            return Ok(());
        }
        let first_key = self
            .current
            .base_key()
            .expect("non-empty block always has a base key")
            .to_vec();
        let finished = std::mem::take(&mut self.current).finish();
        let appended = self.stream.append(&[finished], true)?;
        self.block_index.push(BlockOffset {
            key: first_key,
            extent_id: appended.extent_id,
            offset: appended.offsets[0],
        });
        self.current = BlockBuilder::new();
        Ok(())
    }

    /// Finalizes the table: flushes any pending block, builds and appends
    /// the meta block, and returns the table's root location.
    #[allow(clippy::too_many_arguments)]
    pub fn finish_all(
        mut self,
        vp_extent_id: u64,
        vp_offset: u32,
        seq_num: u64,
        discards: HashMap<u64, i64>,
        estimated_size: u64,
    ) -> Result<Location, TableError> {
        self.finish_block()?;
        if self.block_index.is_empty() {
            return Err(TableError::EmptyTable);
        }

        let table_index = TableIndex {
            block_index: self.block_index,
            bloom_filter: self.bloom.as_slice().to_vec(),
            estimated_size,
            seq_num,
            vp_extent_id,
            vp_offset,
            discards,
            compression_type: CompressionType::None,
            compressed_size: estimated_size,
            uncompressed_size: estimated_size,
        };

        let encoded = encode_to_vec(&table_index)?;
        let meta_value = ValueStruct::inline(0, encoded);
        let meta_block = crate::block::encode_single_entry(&[], &meta_value);
        let appended = self.stream.append(&[meta_block], true)?;
        Ok(Location {
            extent_id: appended.extent_id,
            offset: appended.offsets[0],
        })
    }

    pub fn key_count(&self) -> u64 {
        self.key_count
    }
}
