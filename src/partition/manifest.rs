//! The partition's manifest: an append-only log of table-set mutations
//! written to the meta stream (§4.F "Flush"/"Compaction", §9 "Manifest").
//!
//! Each record is framed the same way as everything else this crate writes
//! — a single-entry block (see [`crate::block::encode_single_entry`])
//! carrying an encoded [`ManifestRecord`]. Replay folds the record stream
//! into the live `(Location, seq_num)` set in append order.

use std::sync::Arc;

use crate::block::{Payload, ValueStruct, decode_single_entry, encode_single_entry};
use crate::encoding::{decode_from_slice, encode_to_vec};
use crate::stream::{StreamClient, StreamError};
use crate::wire::{Location, ManifestRecord};

use super::PartitionError;

/// The manifest's state as of the end of replay: the surviving
/// `(loc, seq_num)` table set, plus every extent GC has released, in the
/// order its `ReleaseExtent` record was appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestState {
    pub live_tables: Vec<(Location, u64)>,
    pub released_extents: Vec<u64>,
}

/// Appends and replays manifest records against a single meta stream.
pub struct PartitionManifest {
    meta_stream: Arc<dyn StreamClient>,
}

impl PartitionManifest {
    pub fn new(meta_stream: Arc<dyn StreamClient>) -> Self {
        Self { meta_stream }
    }

    pub fn append_add_table(&self, loc: Location, seq_num: u64) -> Result<(), PartitionError> {
        self.append(ManifestRecord::AddTable { loc, seq_num })
    }

    pub fn append_remove_table(&self, loc: Location) -> Result<(), PartitionError> {
        self.append(ManifestRecord::RemoveTable { loc })
    }

    pub fn append_release_extent(&self, extent_id: u64) -> Result<(), PartitionError> {
        self.append(ManifestRecord::ReleaseExtent { extent_id })
    }

    fn append(&self, record: ManifestRecord) -> Result<(), PartitionError> {
        let encoded = encode_to_vec(&record)?;
        let value = ValueStruct::inline(0, encoded);
        let block = encode_single_entry(&[], &value);
        self.meta_stream.append(&[block], true)?;
        Ok(())
    }

    /// Reads every manifest record from the start of the meta stream and
    /// folds `AddTable`/`RemoveTable`/`ReleaseExtent` into the surviving
    /// state, in append order.
    pub fn replay(&self) -> Result<ManifestState, PartitionError> {
        let mut state = ManifestState::default();
        let info = self.meta_stream.stream_info();
        for extent_id in info.extent_ids {
            let mut offset = 0u32;
            loop {
                let read = match self.meta_stream.read(extent_id, offset, 1) {
                    Ok(r) => r,
                    Err(StreamError::OffsetOutOfRange { .. }) => break,
                    Err(e) => return Err(e.into()),
                };
                let Some(raw) = read.blocks.first() else {
                    break;
                };
                let (_, value) = decode_single_entry(raw)?;
                let Payload::Inline(bytes) = value.payload else {
                    return Err(PartitionError::Internal(
                        "manifest record payload was a value pointer".into(),
                    ));
                };
                let (record, _) = decode_from_slice::<ManifestRecord>(&bytes)?;
                match record {
                    ManifestRecord::AddTable { loc, seq_num } => {
                        state.live_tables.push((loc, seq_num))
                    }
                    ManifestRecord::RemoveTable { loc } => {
                        state.live_tables.retain(|(l, _)| *l != loc)
                    }
                    ManifestRecord::ReleaseExtent { extent_id } => {
                        state.released_extents.push(extent_id)
                    }
                }
                offset = read.end_offset;
            }
        }
        Ok(state)
    }
}
