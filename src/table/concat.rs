//! Iterator over tables whose key ranges are disjoint and ascending
//! (§4.D). `seek` binary-searches the table list by `(smallest, biggest)`
//! then delegates to the selected table's iterator.

use std::sync::Arc;

use super::iterator::{TableIter, TableIterator};
use super::{Table, TableError};

/// Concatenates a sequence of tables with disjoint, ascending key ranges
/// into one logical iterator.
pub struct ConcatIterator {
    tables: Vec<Arc<Table>>,
    child_idx: Option<usize>,
    child: Option<TableIterator>,
}

impl ConcatIterator {
    pub fn new(tables: Vec<Arc<Table>>) -> Self {
        Self {
            tables,
            child_idx: None,
            child: None,
        }
    }

    fn set_child(&mut self, idx: usize) -> Option<&mut TableIterator> {
        if idx >= self.tables.len() {
            self.child_idx = None;
            self.child = None;
            return None;
        }
        self.child_idx = Some(idx);
        self.child = Some(TableIterator::new(Arc::clone(&self.tables[idx])));
        self.child.as_mut()
    }

    /// Finds the table whose range could contain `target`: the first
    /// table whose `biggest >= target`.
    fn find_table_for(&self, target: &[u8]) -> Option<usize> {
        self.tables
            .iter()
            .position(|t| t.biggest() >= target)
    }

    /// Finds the table for `seek_for_prev`: the last table whose
    /// `smallest <= target`.
    fn find_table_for_prev(&self, target: &[u8]) -> Option<usize> {
        let n = self.tables.len();
        if n == 0 {
            return None;
        }
        let idx = (0..n).partition_point(|&i| self.tables[i].smallest() <= target);
        if idx == 0 {
            None
        } else {
            Some(idx - 1)
        }
    }
}

impl TableIter for ConcatIterator {
    fn rewind(&mut self) -> Result<(), TableError> {
        if self.tables.is_empty() {
            self.child_idx = None;
            self.child = None;
            return Ok(());
        }
        if let Some(child) = self.set_child(0) {
            child.rewind()?;
        }
        Ok(())
    }

    fn rewind_to_last(&mut self) -> Result<(), TableError> {
        if self.tables.is_empty() {
            self.child_idx = None;
            self.child = None;
            return Ok(());
        }
        let last = self.tables.len() - 1;
        if let Some(child) = self.set_child(last) {
            child.rewind_to_last()?;
        }
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        let Some(idx) = self.find_table_for(target) else {
            self.child_idx = None;
            self.child = None;
            return Ok(());
        };
        if let Some(child) = self.set_child(idx) {
            child.seek(target)?;
        }
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<(), TableError> {
        let Some(idx) = self.find_table_for_prev(target) else {
            self.child_idx = None;
            self.child = None;
            return Ok(());
        };
        if let Some(child) = self.set_child(idx) {
            child.seek_for_prev(target)?;
        }
        Ok(())
    }

    fn next(&mut self) -> Result<(), TableError> {
        let Some(idx) = self.child_idx else {
            return Ok(());
        };
        if let Some(child) = self.child.as_mut() {
            child.next()?;
            if child.valid() {
                return Ok(());
            }
        }
        let next_idx = idx + 1;
        if let Some(child) = self.set_child(next_idx) {
            child.rewind()?;
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<(), TableError> {
        let Some(idx) = self.child_idx else {
            return Ok(());
        };
        if let Some(child) = self.child.as_mut() {
            child.prev()?;
            if child.valid() {
                return Ok(());
            }
        }
        if idx == 0 {
            self.child_idx = None;
            self.child = None;
            return Ok(());
        }
        if let Some(child) = self.set_child(idx - 1) {
            child.rewind_to_last()?;
        }
        Ok(())
    }

    fn valid(&self) -> bool {
        self.child.as_ref().map(|c| c.valid()).unwrap_or(false)
    }

    fn key(&self) -> Vec<u8> {
        self.child.as_ref().map(|c| c.key()).unwrap_or_default()
    }

    fn value(&self) -> crate::block::ValueStruct {
        self.child
            .as_ref()
            .map(|c| c.value())
            .unwrap_or_else(|| crate::block::ValueStruct::inline(0, Vec::new()))
    }
}
