//! Wire types persisted outside the block format itself: partition,
//! stream, and extent metadata records, plus the table footer's
//! `TableIndex`. These are the payloads carried inside single-entry
//! blocks (see [`crate::block::encode_single_entry`]) for manifest
//! records, or serialized directly as values under the persisted keys
//! `PART/<id>`, `STREAM/<id>`, `EXTENT/<id>` that [`crate::manager`]
//! reads and writes through its `TransactionalKV`.

use std::collections::HashMap;

use crate::encoding::{self, decode_vec, encode_vec, Decode, Encode, EncodingError};

/// A table's key range, inclusive of `start_key`, exclusive of `end_key`.
/// An empty `end_key` means "unbounded" (the partition covers everything
/// from `start_key` onward).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Range {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

impl Encode for Range {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.start_key.encode_to(buf)?;
        self.end_key.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Range {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (start_key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (end_key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Range { start_key, end_key }, offset))
    }
}

/// `PART/<partID>` — persisted partition metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMeta {
    pub part_id: u64,
    pub log_stream: u64,
    pub row_stream: u64,
    pub meta_stream: u64,
    pub rg: Range,
}

impl Encode for PartitionMeta {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.part_id.encode_to(buf)?;
        self.log_stream.encode_to(buf)?;
        self.row_stream.encode_to(buf)?;
        self.meta_stream.encode_to(buf)?;
        self.rg.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for PartitionMeta {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (part_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (log_stream, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (row_stream, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (meta_stream, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (rg, n) = Range::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            PartitionMeta {
                part_id,
                log_stream,
                row_stream,
                meta_stream,
                rg,
            },
            offset,
        ))
    }
}

/// `STREAM/<streamID>` — the ordered extent list backing a logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamInfo {
    pub stream_id: u64,
    pub extent_ids: Vec<u64>,
}

impl Encode for StreamInfo {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.stream_id.encode_to(buf)?;
        encode_vec(&self.extent_ids, buf)?;
        Ok(())
    }
}

impl Decode for StreamInfo {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (stream_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (extent_ids, n) = decode_vec::<u64>(&buf[offset..])?;
        offset += n;
        Ok((
            StreamInfo {
                stream_id,
                extent_ids,
            },
            offset,
        ))
    }
}

/// `EXTENT/<extentID>` — refcount, version, and placement for one extent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtentInfo {
    pub extent_id: u64,
    /// Number of streams referencing this extent.
    pub refs: u32,
    /// Bumped every time this extent is duplicated into another stream.
    pub eversion: u64,
    /// Length of the sealed, durable prefix. Equal to the full extent
    /// length once sealed; growing for the currently-open extent.
    pub sealed_length: u32,
    /// Whether this extent still accepts appends.
    pub avali: bool,
    /// Opaque placement-service node ids; never dereferenced by this crate.
    pub replicas: Vec<u64>,
    pub parity: Vec<u64>,
}

impl Encode for ExtentInfo {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.extent_id.encode_to(buf)?;
        self.refs.encode_to(buf)?;
        self.eversion.encode_to(buf)?;
        self.sealed_length.encode_to(buf)?;
        self.avali.encode_to(buf)?;
        encode_vec(&self.replicas, buf)?;
        encode_vec(&self.parity, buf)?;
        Ok(())
    }
}

impl Decode for ExtentInfo {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (extent_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (refs, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (eversion, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (sealed_length, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (avali, n) = bool::decode_from(&buf[offset..])?;
        offset += n;
        let (replicas, n) = decode_vec::<u64>(&buf[offset..])?;
        offset += n;
        let (parity, n) = decode_vec::<u64>(&buf[offset..])?;
        offset += n;
        Ok((
            ExtentInfo {
                extent_id,
                refs,
                eversion,
                sealed_length,
                avali,
                replicas,
                parity,
            },
            offset,
        ))
    }
}

/// One entry in a table's block index: the first (smallest) key of a data
/// block, and the `(extentID, offset)` where that block lives in the row
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockOffset {
    pub key: Vec<u8>,
    pub extent_id: u64,
    pub offset: u32,
}

impl Encode for BlockOffset {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.key.encode_to(buf)?;
        self.extent_id.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for BlockOffset {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (key, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (extent_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (block_offset, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            BlockOffset {
                key,
                extent_id,
                offset: block_offset,
            },
            offset,
        ))
    }
}

/// On-disk compression applied to table data blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionType {
    #[default]
    None = 0,
    Snappy = 1,
    Zstd = 2,
}

impl Encode for CompressionType {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let tag: u32 = match self {
            CompressionType::None => 0,
            CompressionType::Snappy => 1,
            CompressionType::Zstd => 2,
        };
        tag.encode_to(buf)
    }
}

impl Decode for CompressionType {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u32::decode_from(buf)?;
        let value = match tag {
            0 => CompressionType::None,
            1 => CompressionType::Snappy,
            2 => CompressionType::Zstd,
            other => {
                return Err(EncodingError::InvalidTag {
                    tag: other,
                    type_name: "CompressionType",
                })
            }
        };
        Ok((value, consumed))
    }
}

/// The table footer's meta block payload: everything needed to open a
/// table without re-scanning its data blocks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableIndex {
    pub block_index: Vec<BlockOffset>,
    pub bloom_filter: Vec<u8>,
    pub estimated_size: u64,
    /// Highest sequence number of any entry in this table.
    pub seq_num: u64,
    /// Recovery cursor: all values at sequences <= `seq_num` are durable in
    /// the log stream up to this `(extent, offset)`.
    pub vp_extent_id: u64,
    pub vp_offset: u32,
    /// Bytes obsoleted per source log extent, keyed by extent id.
    pub discards: HashMap<u64, i64>,
    pub compression_type: CompressionType,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl Encode for TableIndex {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encode_vec(&self.block_index, buf)?;
        self.bloom_filter.encode_to(buf)?;
        self.estimated_size.encode_to(buf)?;
        self.seq_num.encode_to(buf)?;
        self.vp_extent_id.encode_to(buf)?;
        self.vp_offset.encode_to(buf)?;
        encoding::encode_u64_i64_map(&self.discards, buf)?;
        self.compression_type.encode_to(buf)?;
        self.compressed_size.encode_to(buf)?;
        self.uncompressed_size.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for TableIndex {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (block_index, n) = decode_vec::<BlockOffset>(&buf[offset..])?;
        offset += n;
        let (bloom_filter, n) = Vec::<u8>::decode_from(&buf[offset..])?;
        offset += n;
        let (estimated_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (seq_num, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (vp_extent_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (vp_offset, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        let (discards, n) = encoding::decode_u64_i64_map(&buf[offset..])?;
        offset += n;
        let (compression_type, n) = CompressionType::decode_from(&buf[offset..])?;
        offset += n;
        let (compressed_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (uncompressed_size, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            TableIndex {
                block_index,
                bloom_filter,
                estimated_size,
                seq_num,
                vp_extent_id,
                vp_offset,
                discards,
                compression_type,
                compressed_size,
                uncompressed_size,
            },
            offset,
        ))
    }
}

/// A table's root location: the `(extentID, offset)` of its meta block in
/// the row stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub extent_id: u64,
    pub offset: u32,
}

impl Encode for Location {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.extent_id.encode_to(buf)?;
        self.offset.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for Location {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (extent_id, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        let (loc_offset, n) = u32::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Location {
                extent_id,
                offset: loc_offset,
            },
            offset,
        ))
    }
}

/// A manifest record appended to the meta stream: a new table's location,
/// a table dropped after compaction, or a log extent released by GC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestRecord {
    AddTable { loc: Location, seq_num: u64 },
    RemoveTable { loc: Location },
    /// Emitted once a GC pass has relocated every live entry out of
    /// `extent_id` (§4.F "GC of log extents", step 4). This is a signal to
    /// the stream manager to decrement the extent's refcount; the manifest
    /// itself does not track extent liveness.
    ReleaseExtent { extent_id: u64 },
}

impl Encode for ManifestRecord {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            ManifestRecord::AddTable { loc, seq_num } => {
                0u32.encode_to(buf)?;
                loc.encode_to(buf)?;
                seq_num.encode_to(buf)?;
            }
            ManifestRecord::RemoveTable { loc } => {
                1u32.encode_to(buf)?;
                loc.encode_to(buf)?;
            }
            ManifestRecord::ReleaseExtent { extent_id } => {
                2u32.encode_to(buf)?;
                extent_id.encode_to(buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for ManifestRecord {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, mut offset) = u32::decode_from(buf)?;
        match tag {
            0 => {
                let (loc, n) = Location::decode_from(&buf[offset..])?;
                offset += n;
                let (seq_num, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((ManifestRecord::AddTable { loc, seq_num }, offset))
            }
            1 => {
                let (loc, n) = Location::decode_from(&buf[offset..])?;
                offset += n;
                Ok((ManifestRecord::RemoveTable { loc }, offset))
            }
            2 => {
                let (extent_id, n) = u64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((ManifestRecord::ReleaseExtent { extent_id }, offset))
            }
            other => Err(EncodingError::InvalidTag {
                tag: other,
                type_name: "ManifestRecord",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Encode + Decode + PartialEq + std::fmt::Debug>(value: T) {
        let bytes = encoding::encode_to_vec(&value).unwrap();
        let (decoded, consumed) = T::decode_from(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, value);
    }

    #[test]
    fn partition_meta_round_trips() {
        round_trip(PartitionMeta {
            part_id: 1,
            log_stream: 2,
            row_stream: 3,
            meta_stream: 4,
            rg: Range {
                start_key: b"a".to_vec(),
                end_key: b"m".to_vec(),
            },
        });
    }

    #[test]
    fn stream_info_round_trips() {
        round_trip(StreamInfo {
            stream_id: 7,
            extent_ids: vec![1, 2, 3],
        });
    }

    #[test]
    fn extent_info_round_trips() {
        round_trip(ExtentInfo {
            extent_id: 9,
            refs: 2,
            eversion: 5,
            sealed_length: 4096,
            avali: true,
            replicas: vec![10, 11],
            parity: vec![12],
        });
    }

    #[test]
    fn table_index_round_trips_with_discards() {
        let mut discards = HashMap::new();
        discards.insert(1, 100);
        discards.insert(2, -50);
        round_trip(TableIndex {
            block_index: vec![BlockOffset {
                key: b"key0000".to_vec(),
                extent_id: 1,
                offset: 0,
            }],
            bloom_filter: vec![1, 2, 3, 4],
            estimated_size: 4096,
            seq_num: 42,
            vp_extent_id: 1,
            vp_offset: 128,
            discards,
            compression_type: CompressionType::Zstd,
            compressed_size: 2048,
            uncompressed_size: 4096,
        });
    }

    #[test]
    fn manifest_record_variants_round_trip() {
        round_trip(ManifestRecord::AddTable {
            loc: Location {
                extent_id: 3,
                offset: 64,
            },
            seq_num: 10,
        });
        round_trip(ManifestRecord::RemoveTable {
            loc: Location {
                extent_id: 3,
                offset: 64,
            },
        });
        round_trip(ManifestRecord::ReleaseExtent { extent_id: 9 });
    }
}
