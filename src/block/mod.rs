//! Block codec — the single on-disk framing format shared by table data
//! blocks, the table's trailing meta block, log records, and manifest
//! records (§4.A, §6).
//!
//! ```text
//! block      = entries || offsets || N || CRC32
//! entries[i] = u16 overlap || u16 diff || diff bytes key_suffix || value_record
//! value_record = u8 meta || u32 value_or_vp_size || value|vp_bytes
//! offsets    = u32 × N   (start offset of each entry in 'entries')
//! N          = u32
//! CRC32      = crc(entries || offsets || N)   [IEEE polynomial]
//! ```
//!
//! `overlap`/`diff` compress each entry's key against the block's *base
//! key* — the first key added to the block — not against the previous
//! entry. This makes every entry independently decodable given the base
//! key, which is what lets [`Block::seek`] binary-search without a
//! sequential scan.


use crc32fast::Hasher as Crc32;
use thiserror::Error;

use crate::key;

/// Flag bit in [`ValueStruct::meta`]: this entry is a deletion tombstone.
pub const META_DELETE: u8 = 1 << 0;
/// Flag bit in [`ValueStruct::meta`]: the payload is a value pointer, not an inline value.
pub const META_VALUE_POINTER: u8 = 1 << 1;

/// Errors raised while decoding a block.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    /// Block shorter than the minimum 8-byte trailer (`N` + `CRC32`).
    #[error("block truncated: {0} bytes, need at least 8")]
    Truncated(usize),

    /// `entries_index_start` computed as negative — `N` does not fit the block.
    #[error("block truncated: entry offset index does not fit in {0} bytes")]
    BadEntryCount(usize),

    /// Trailing CRC32 did not match the computed checksum.
    #[error("checksum mismatch: expected {expected:#x}, computed {computed:#x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    /// An entry index was out of `[0, num_entries)`.
    #[error("entry index {0} out of bounds ({1} entries)")]
    IndexOutOfBounds(usize, usize),
}

/// A decoded value: deletion flag / value-pointer flag plus the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueStruct {
    pub meta: u8,
    pub payload: Payload,
}

/// The value-or-pointer payload of a [`ValueStruct`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Value bytes stored directly in the block.
    Inline(Vec<u8>),
    /// A pointer into the log stream: `(extent_id, offset, size)`.
    ValuePointer { extent_id: u64, offset: u32, size: u32 },
}

impl ValueStruct {
    pub fn inline(meta: u8, value: Vec<u8>) -> Self {
        Self {
            meta: meta & !META_VALUE_POINTER,
            payload: Payload::Inline(value),
        }
    }

    pub fn pointer(meta: u8, extent_id: u64, offset: u32, size: u32) -> Self {
        Self {
            meta: meta | META_VALUE_POINTER,
            payload: Payload::ValuePointer {
                extent_id,
                offset,
                size,
            },
        }
    }

    pub fn is_delete(&self) -> bool {
        self.meta & META_DELETE != 0
    }

    pub fn is_value_pointer(&self) -> bool {
        self.meta & META_VALUE_POINTER != 0
    }

    /// Size, in bytes, this value contributes to a memtable's `estimated_size`.
    pub fn approx_size(&self) -> usize {
        1 + match &self.payload {
            Payload::Inline(v) => v.len(),
            Payload::ValuePointer { .. } => 16,
        }
    }

    fn encode_payload(&self, buf: &mut Vec<u8>) {
        buf.push(self.meta);
        match &self.payload {
            Payload::Inline(v) => {
                buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
                buf.extend_from_slice(v);
            }
            Payload::ValuePointer {
                extent_id,
                offset,
                size,
            } => {
                buf.extend_from_slice(&16u32.to_le_bytes());
                buf.extend_from_slice(&extent_id.to_le_bytes());
                buf.extend_from_slice(&offset.to_le_bytes());
                buf.extend_from_slice(&size.to_le_bytes());
            }
        }
    }

    fn decode_payload(data: &[u8]) -> Result<(Self, usize), BlockError> {
        if data.len() < 5 {
            return Err(BlockError::Truncated(data.len()));
        }
        let meta = data[0];
        let size = u32::from_le_bytes([data[1], data[2], data[3], data[4]]) as usize;
        let body = &data[5..];
        if body.len() < size {
            return Err(BlockError::Truncated(data.len()));
        }
        let payload = if meta & META_VALUE_POINTER != 0 {
            if size != 16 {
                return Err(BlockError::Truncated(data.len()));
            }
            let extent_id = u64::from_le_bytes(body[0..8].try_into().unwrap_or_default());
            let offset = u32::from_le_bytes(body[8..12].try_into().unwrap_or_default());
            let vp_size = u32::from_le_bytes(body[12..16].try_into().unwrap_or_default());
            Payload::ValuePointer {
                extent_id,
                offset,
                size: vp_size,
            }
        } else {
            Payload::Inline(body[..size].to_vec())
        };
        Ok((Self { meta, payload }, 5 + size))
    }
}

/// Accumulates `(key, value)` pairs into a single framed block.
///
/// Used both for table data blocks (via `crate::table::builder`) and for
/// one-off single-entry blocks (log records, manifest records).
#[derive(Default)]
pub struct BlockBuilder {
    base_key: Option<Vec<u8>>,
    entries: Vec<u8>,
    offsets: Vec<u32>,
}

impl BlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn num_entries(&self) -> usize {
        self.offsets.len()
    }

    /// The first key added to this block (the compression anchor), if any.
    pub fn base_key(&self) -> Option<&[u8]> {
        self.base_key.as_deref()
    }

    /// Approximate size of the block if finished right now. Callers use this
    /// to decide when to call [`Self::finish`] and start a fresh block.
    pub fn estimated_size(&self) -> usize {
        self.entries.len() + 4 * self.offsets.len() + 8
    }

    /// Appends one entry. `key` is the full stored key (user bytes plus
    /// inverted timestamp suffix, see [`crate::key`]).
    pub fn add(&mut self, stored_key: &[u8], value: &ValueStruct) {
        let offset = self.entries.len() as u32;
        self.offsets.push(offset);

        let (overlap, diff_bytes): (u16, &[u8]) = match &self.base_key {
            None => {
                self.base_key = Some(stored_key.to_vec());
                (0, stored_key)
            }
            Some(base) => {
                let overlap = key::common_prefix_len(base, stored_key);
                (overlap as u16, &stored_key[overlap..])
            }
        };

        self.entries.extend_from_slice(&overlap.to_le_bytes());
        self.entries
            .extend_from_slice(&(diff_bytes.len() as u16).to_le_bytes());
        self.entries.extend_from_slice(diff_bytes);
        value.encode_payload(&mut self.entries);
    }

    /// Finalizes the block: appends the offset index, entry count, and a
    /// trailing CRC32 over everything preceding it.
    pub fn finish(self) -> Vec<u8> {
        let mut out = self.entries;
        for off in &self.offsets {
            out.extend_from_slice(&off.to_le_bytes());
        }
        out.extend_from_slice(&(self.offsets.len() as u32).to_le_bytes());

        let mut hasher = Crc32::new();
        hasher.update(&out);
        let crc = hasher.finalize();
        out.extend_from_slice(&crc.to_le_bytes());
        out
    }
}

/// A decoded, checksum-verified block ready for random-access entry reads.
pub struct Block {
    /// Raw bytes excluding the trailing CRC32 (entries || offsets || N).
    data: Vec<u8>,
    entries_index_start: usize,
    num_entries: usize,
    base_key: Vec<u8>,
}

impl Block {
    /// Decodes and checksum-verifies a raw block, as read from a stream.
    pub fn decode(raw: &[u8]) -> Result<Self, BlockError> {
        if raw.len() < 8 {
            return Err(BlockError::Truncated(raw.len()));
        }
        let expected = u32::from_le_bytes(raw[raw.len() - 4..].try_into().unwrap_or_default());
        let body = &raw[..raw.len() - 4];
        let mut hasher = Crc32::new();
        hasher.update(body);
        let computed = hasher.finalize();
        if computed != expected {
            return Err(BlockError::ChecksumMismatch {
                expected,
                computed,
            });
        }

        let num_entries =
            u32::from_le_bytes(body[body.len() - 4..].try_into().unwrap_or_default()) as usize;
        let entries_index_start = (body.len() as i64) - 4 - 4 * (num_entries as i64);
        if entries_index_start < 0 {
            return Err(BlockError::BadEntryCount(raw.len()));
        }
        let entries_index_start = entries_index_start as usize;

        let mut block = Self {
            data: body.to_vec(),
            entries_index_start,
            num_entries,
            base_key: Vec::new(),
        };
        if num_entries > 0 {
            let (base_key, _) = block.decode_entry_at(0)?;
            block.base_key = base_key;
        }
        Ok(block)
    }

    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    fn entry_offset(&self, idx: usize) -> usize {
        let start = self.entries_index_start + 4 * idx;
        u32::from_le_bytes(self.data[start..start + 4].try_into().unwrap_or_default()) as usize
    }

    fn entry_span(&self, idx: usize) -> (usize, usize) {
        let start = self.entry_offset(idx);
        let end = if idx + 1 < self.num_entries {
            self.entry_offset(idx + 1)
        } else {
            self.entries_index_start
        };
        (start, end)
    }

    /// Decodes entry `idx`, returning its full stored key and value.
    pub fn entry(&self, idx: usize) -> Result<(Vec<u8>, ValueStruct), BlockError> {
        if idx >= self.num_entries {
            return Err(BlockError::IndexOutOfBounds(idx, self.num_entries));
        }
        self.decode_entry_at(idx)
    }

    fn decode_entry_at(&self, idx: usize) -> Result<(Vec<u8>, ValueStruct), BlockError> {
        let (start, end) = self.entry_span(idx);
        let raw = &self.data[start..end];
        if raw.len() < 4 {
            return Err(BlockError::Truncated(raw.len()));
        }
        let overlap = u16::from_le_bytes([raw[0], raw[1]]) as usize;
        let diff = u16::from_le_bytes([raw[2], raw[3]]) as usize;
        if raw.len() < 4 + diff {
            return Err(BlockError::Truncated(raw.len()));
        }
        let suffix = &raw[4..4 + diff];
        let stored_key = if idx == 0 {
            suffix.to_vec()
        } else {
            let mut k = Vec::with_capacity(overlap + diff);
            k.extend_from_slice(&self.base_key[..overlap.min(self.base_key.len())]);
            k.extend_from_slice(suffix);
            k
        };
        let (value, _) = ValueStruct::decode_payload(&raw[4 + diff..])?;
        Ok((stored_key, value))
    }

    /// Binary-searches for the first entry whose key is `>= target`.
    /// Returns `None` if every entry's key is `< target`.
    pub fn seek(&self, target: &[u8]) -> Result<Option<usize>, BlockError> {
        let mut lo = 0usize;
        let mut hi = self.num_entries;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let (key, _) = self.decode_entry_at(mid)?;
            if key.as_slice() < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == self.num_entries {
            Ok(None)
        } else {
            Ok(Some(lo))
        }
    }
}

/// Convenience: encode a single `(key, value)` pair as a one-entry block.
/// Used for log records and manifest records, where each logical record
/// is its own block.
pub fn encode_single_entry(stored_key: &[u8], value: &ValueStruct) -> Vec<u8> {
    let mut b = BlockBuilder::new();
    b.add(stored_key, value);
    b.finish()
}

/// Decode a one-entry block produced by [`encode_single_entry`].
pub fn decode_single_entry(raw: &[u8]) -> Result<(Vec<u8>, ValueStruct), BlockError> {
    let block = Block::decode(raw)?;
    block.entry(0)
}
