//! Single-table iterator (§4.D): `(block index, entry index)` plus a
//! cached decoded block, supporting seek/seek-for-prev and stepwise
//! next/prev.

use std::sync::Arc;

use crate::block::{Block, ValueStruct};

use super::{Table, TableError};

/// The primitive operations shared by [`TableIterator`], [`super::ConcatIterator`],
/// and [`super::MergeIterator`]. `next`/`prev` are direction-agnostic steps;
/// callers compose `rewind`/`seek` with `next`, or `rewind_to_last`/`seek_for_prev`
/// with `prev`, to iterate in ascending or descending order respectively.
pub trait TableIter {
    fn rewind(&mut self) -> Result<(), TableError>;
    fn rewind_to_last(&mut self) -> Result<(), TableError>;
    fn seek(&mut self, target: &[u8]) -> Result<(), TableError>;
    fn seek_for_prev(&mut self, target: &[u8]) -> Result<(), TableError>;
    fn next(&mut self) -> Result<(), TableError>;
    fn prev(&mut self) -> Result<(), TableError>;
    fn valid(&self) -> bool;
    fn key(&self) -> Vec<u8>;
    fn value(&self) -> ValueStruct;
}

/// Iterates the entries of a single table in block-index then entry-index
/// order.
pub struct TableIterator {
    table: Arc<Table>,
    block_idx: Option<usize>,
    entry_idx: usize,
    current_block: Option<Block>,
}

impl TableIterator {
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            block_idx: None,
            entry_idx: 0,
            current_block: None,
        }
    }

    fn load_block(&mut self, idx: usize) -> Result<(), TableError> {
        self.current_block = Some(self.table.block(idx)?);
        self.block_idx = Some(idx);
        Ok(())
    }

    fn invalidate(&mut self) {
        self.block_idx = None;
        self.current_block = None;
        self.entry_idx = 0;
    }

    /// Binary-searches the block index for the last block whose first key
    /// is `<= target`. Returns `None` if every block's first key is `> target`.
    fn find_block_for(&self, target: &[u8]) -> Option<usize> {
        let n = self.table.num_blocks();
        if n == 0 {
            return None;
        }
        // partition_point finds the first block whose key is > target.
        let idx = (0..n).partition_point(|&i| self.table_block_key(i) <= target);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }

    fn table_block_key(&self, idx: usize) -> &[u8] {
        self.table.block_index_key(idx)
    }
}

impl TableIter for TableIterator {
    fn rewind(&mut self) -> Result<(), TableError> {
        if self.table.num_blocks() == 0 {
            self.invalidate();
            return Ok(());
        }
        self.load_block(0)?;
        self.entry_idx = 0;
        Ok(())
    }

    fn rewind_to_last(&mut self) -> Result<(), TableError> {
        let n = self.table.num_blocks();
        if n == 0 {
            self.invalidate();
            return Ok(());
        }
        self.load_block(n - 1)?;
        let block = self.current_block.as_ref().expect("just loaded");
        self.entry_idx = block.num_entries().saturating_sub(1);
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        let Some(mut idx) = self.find_block_for(target) else {
            // target is before every block's first key: first block, first entry.
            return self.rewind();
        };
        self.load_block(idx)?;
        loop {
            let block = self.current_block.as_ref().expect("just loaded");
            match block.seek(target)? {
                Some(entry_idx) => {
                    self.entry_idx = entry_idx;
                    return Ok(());
                }
                None => {
                    idx += 1;
                    if idx >= self.table.num_blocks() {
                        self.invalidate();
                        return Ok(());
                    }
                    self.load_block(idx)?;
                }
            }
        }
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<(), TableError> {
        let Some(mut idx) = self.find_block_for(target) else {
            self.invalidate();
            return Ok(());
        };
        self.load_block(idx)?;
        loop {
            let block = self.current_block.as_ref().expect("just loaded");
            match block.seek(target)? {
                None => {
                    // every entry in this block is < target: last entry is the answer.
                    self.entry_idx = block.num_entries().saturating_sub(1);
                    return Ok(());
                }
                Some(found_idx) => {
                    let (found_key, _) = block.entry(found_idx)?;
                    if found_key.as_slice() == target {
                        self.entry_idx = found_idx;
                        return Ok(());
                    }
                    if found_idx > 0 {
                        self.entry_idx = found_idx - 1;
                        return Ok(());
                    }
                    // need the previous block's last entry.
                    if idx == 0 {
                        self.invalidate();
                        return Ok(());
                    }
                    idx -= 1;
                    self.load_block(idx)?;
                }
            }
        }
    }

    fn next(&mut self) -> Result<(), TableError> {
        let Some(idx) = self.block_idx else {
            return Ok(());
        };
        let num_entries = self
            .current_block
            .as_ref()
            .map(|b| b.num_entries())
            .unwrap_or(0);
        if self.entry_idx + 1 < num_entries {
            self.entry_idx += 1;
            return Ok(());
        }
        let next_idx = idx + 1;
        if next_idx >= self.table.num_blocks() {
            self.invalidate();
            return Ok(());
        }
        self.load_block(next_idx)?;
        self.entry_idx = 0;
        Ok(())
    }

    fn prev(&mut self) -> Result<(), TableError> {
        let Some(idx) = self.block_idx else {
            return Ok(());
        };
        if self.entry_idx > 0 {
            self.entry_idx -= 1;
            return Ok(());
        }
        if idx == 0 {
            self.invalidate();
            return Ok(());
        }
        let prev_idx = idx - 1;
        self.load_block(prev_idx)?;
        let block = self.current_block.as_ref().expect("just loaded");
        self.entry_idx = block.num_entries().saturating_sub(1);
        Ok(())
    }

    fn valid(&self) -> bool {
        match (&self.block_idx, &self.current_block) {
            (Some(_), Some(block)) => self.entry_idx < block.num_entries(),
            _ => false,
        }
    }

    fn key(&self) -> Vec<u8> {
        self.current_block
            .as_ref()
            .and_then(|b| b.entry(self.entry_idx).ok())
            .map(|(k, _)| k)
            .unwrap_or_default()
    }

    fn value(&self) -> ValueStruct {
        self.current_block
            .as_ref()
            .and_then(|b| b.entry(self.entry_idx).ok())
            .map(|(_, v)| v)
            .unwrap_or_else(|| ValueStruct::inline(0, Vec::new()))
    }
}
