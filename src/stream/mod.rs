//! Stream abstraction — the append-only, multi-extent log that the block
//! codec, table builder/reader, and memtable flush path all write through.
//!
//! A stream is an ordered sequence of *extents*; an extent is an append-only
//! byte container addressed by a 64-bit id, with bytes inside it addressed by
//! 32-bit offsets. [`StreamClient`] is the seam this crate writes through —
//! production code would back it with a remote extent service, tests back it
//! with [`MockStreamClient`], an in-memory stand-in addressed by extent id
//! rather than by file path.
//!
//! Every block this crate ever writes — log records, table data blocks,
//! table meta blocks, manifest records — goes through [`StreamClient::append`]
//! and comes back through [`StreamClient::read`].

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised by a [`StreamClient`] implementation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// The referenced extent does not exist (never written, or already released).
    #[error("unknown extent {0}")]
    UnknownExtent(u64),

    /// `offset` (or `offset + num_blocks`) falls outside the extent's written range.
    #[error("offset {offset} out of range for extent {extent_id} (len {len})")]
    OffsetOutOfRange {
        extent_id: u64,
        offset: u32,
        len: u32,
    },

    /// The extent is sealed and cannot accept further appends.
    #[error("extent {0} is sealed")]
    Sealed(u64),

    /// The call observed a cancellation signal before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal/backend error not covered by the above.
    #[error("stream backend error: {0}")]
    Internal(String),
}

/// Metadata describing the extents that currently make up a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub extent_ids: Vec<u64>,
}

/// The result of a successful [`StreamClient::append`]: the extent the
/// blocks landed in, the start offset of each block within that extent, and
/// the offset immediately following the last block (the new write cursor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendResult {
    pub extent_id: u64,
    pub offsets: Vec<u32>,
    pub end_offset: u32,
}

/// The result of a successful [`StreamClient::read`]: the raw block bytes
/// read back, and the offset immediately following the last block read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResult {
    pub blocks: Vec<Vec<u8>>,
    pub end_offset: u32,
}

/// A cooperative cancellation signal shared between a caller and whatever
/// long-running operation it starts. Cheaply cloneable; cancelling any clone
/// cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<std::sync::atomic::AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// An append-only, multi-extent logical log.
///
/// Implementations own extent allocation and durability; this crate only
/// ever appends whole blocks (as produced by `crate::block::BlockBuilder`)
/// and reads them back by `(extent_id, offset)`.
pub trait StreamClient: Send + Sync {
    /// Appends one or more pre-framed blocks atomically. Returns the extent
    /// they landed in, each block's start offset, and the new end offset.
    fn append(&self, blocks: &[Vec<u8>], must_sync: bool) -> Result<AppendResult, StreamError>;

    /// Reads `num_blocks` blocks starting at `(extent_id, offset)`.
    fn read(
        &self,
        extent_id: u64,
        offset: u32,
        num_blocks: usize,
    ) -> Result<ReadResult, StreamError>;

    /// The ordered list of extents currently backing this stream.
    fn stream_info(&self) -> StreamInfo;

    /// Releases any resources held by this client. Idempotent.
    fn close(&self);
}

#[derive(Debug, Default)]
struct ExtentLog {
    /// Concatenated block bytes, in append order.
    data: Vec<u8>,
    /// Start offset of each block appended so far.
    block_offsets: Vec<u32>,
    sealed: bool,
}

/// An in-memory [`StreamClient`] used throughout this crate's own test
/// suite. Appends always land in the current (last) extent unless it has been
/// explicitly sealed via [`MockStreamClient::seal_current`], after which the
/// next append opens a fresh extent — mirroring how a real stream rolls over
/// once an extent hits its size cap.
#[derive(Debug, Default)]
pub struct MockStreamClient {
    inner: Mutex<MockInner>,
}

#[derive(Debug, Default)]
struct MockInner {
    extents: HashMap<u64, ExtentLog>,
    order: Vec<u64>,
    next_extent_id: u64,
    closed: bool,
}

impl MockStreamClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seals the current (last) extent so the next append opens a new one.
    pub fn seal_current(&self) {
        let mut guard = self.inner.lock().expect("mock stream mutex poisoned");
        if let Some(&id) = guard.order.last() {
            if let Some(extent) = guard.extents.get_mut(&id) {
                extent.sealed = true;
            }
        }
    }

    /// Total number of extents ever allocated (sealed or not).
    pub fn extent_count(&self) -> usize {
        self.inner.lock().expect("mock stream mutex poisoned").order.len()
    }

    /// Removes an extent entirely, simulating garbage-collected reclamation.
    pub fn release_extent(&self, extent_id: u64) {
        let mut guard = self.inner.lock().expect("mock stream mutex poisoned");
        guard.extents.remove(&extent_id);
        guard.order.retain(|&id| id != extent_id);
    }
}

impl StreamClient for MockStreamClient {
    fn append(&self, blocks: &[Vec<u8>], _must_sync: bool) -> Result<AppendResult, StreamError> {
        let mut guard = self.inner.lock().expect("mock stream mutex poisoned");

        let needs_new_extent = match guard.order.last() {
            None => true,
            Some(&id) => guard
                .extents
                .get(&id)
                .map(|e| e.sealed)
                .unwrap_or(true),
        };

        let extent_id = if needs_new_extent {
            let id = guard.next_extent_id;
            guard.next_extent_id += 1;
            guard.extents.insert(id, ExtentLog::default());
            guard.order.push(id);
            trace!(extent_id = id, "mock stream opened new extent");
            id
        } else {
            *guard.order.last().expect("checked above")
        };

        let extent = guard
            .extents
            .get_mut(&extent_id)
            .ok_or(StreamError::UnknownExtent(extent_id))?;
        if extent.sealed {
            return Err(StreamError::Sealed(extent_id));
        }

        let mut offsets = Vec::with_capacity(blocks.len());
        for block in blocks {
            offsets.push(extent.data.len() as u32);
            extent.block_offsets.push(extent.data.len() as u32);
            extent.data.extend_from_slice(block);
        }
        let end_offset = extent.data.len() as u32;

        debug!(extent_id, blocks = blocks.len(), end_offset, "mock stream append");
        Ok(AppendResult {
            extent_id,
            offsets,
            end_offset,
        })
    }

    fn read(
        &self,
        extent_id: u64,
        offset: u32,
        num_blocks: usize,
    ) -> Result<ReadResult, StreamError> {
        let guard = self.inner.lock().expect("mock stream mutex poisoned");
        let extent = guard
            .extents
            .get(&extent_id)
            .ok_or(StreamError::UnknownExtent(extent_id))?;

        let start_idx = extent
            .block_offsets
            .iter()
            .position(|&o| o == offset)
            .ok_or(StreamError::OffsetOutOfRange {
                extent_id,
                offset,
                len: extent.data.len() as u32,
            })?;

        let mut blocks = Vec::with_capacity(num_blocks);
        let mut end_offset = offset;
        for i in 0..num_blocks {
            let idx = start_idx + i;
            if idx >= extent.block_offsets.len() {
                return Err(StreamError::OffsetOutOfRange {
                    extent_id,
                    offset,
                    len: extent.data.len() as u32,
                });
            }
            let start = extent.block_offsets[idx] as usize;
            let end = if idx + 1 < extent.block_offsets.len() {
                extent.block_offsets[idx + 1] as usize
            } else {
                extent.data.len()
            };
            blocks.push(extent.data[start..end].to_vec());
            end_offset = end as u32;
        }

        Ok(ReadResult { blocks, end_offset })
    }

    fn stream_info(&self) -> StreamInfo {
        let guard = self.inner.lock().expect("mock stream mutex poisoned");
        StreamInfo {
            extent_ids: guard.order.clone(),
        }
    }

    fn close(&self) {
        let mut guard = self.inner.lock().expect("mock stream mutex poisoned");
        guard.closed = true;
    }
}
