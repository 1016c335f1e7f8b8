//! Heap-based merge of N arbitrary iterators (§4.D). On a key tie, the
//! iterator that appears earlier in the input slice wins — by convention
//! the caller orders sources newest-first, so "earlier in the slice" means
//! "newest version of this key".

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::block::ValueStruct;

use super::iterator::TableIter;
use super::TableError;

struct HeapItem {
    key: Vec<u8>,
    child_idx: usize,
    reverse: bool,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.child_idx == other.child_idx
    }
}
impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // `BinaryHeap` is a max-heap; we want the "smallest" key on top in
        // ascending mode (reverse=false), so invert the natural comparison.
        // Ties always break toward the smaller `child_idx` (earlier = newer).
        let key_order = if self.reverse {
            self.key.cmp(&other.key)
        } else {
            other.key.cmp(&self.key)
        };
        key_order.then_with(|| other.child_idx.cmp(&self.child_idx))
    }
}

/// Merges N child iterators, ordered by `(key asc-or-desc, iterator id asc)`.
pub struct MergeIterator {
    children: Vec<Box<dyn TableIter>>,
    reverse: bool,
    heap: BinaryHeap<HeapItem>,
    current: Option<(Vec<u8>, ValueStruct)>,
    current_idx: Option<usize>,
}

impl MergeIterator {
    pub fn new(children: Vec<Box<dyn TableIter>>, reverse: bool) -> Self {
        Self {
            children,
            reverse,
            heap: BinaryHeap::new(),
            current: None,
            current_idx: None,
        }
    }

    fn push_if_valid(&mut self, idx: usize) {
        if self.children[idx].valid() {
            self.heap.push(HeapItem {
                key: self.children[idx].key(),
                child_idx: idx,
                reverse: self.reverse,
            });
        }
    }

    fn rebuild_heap(&mut self) {
        self.heap.clear();
        for idx in 0..self.children.len() {
            self.push_if_valid(idx);
        }
        self.establish_current();
    }

    /// Pops the winning item off the heap, advances (and shadows) every
    /// other child currently tied with it, and records the winner as
    /// `current` without advancing it — advancing the winner happens on
    /// the next call to [`TableIter::next`]/[`TableIter::prev`].
    fn establish_current(&mut self) {
        let Some(top) = self.heap.pop() else {
            self.current = None;
            self.current_idx = None;
            return;
        };
        let winning_key = top.key.clone();
        let winning_idx = top.child_idx;
        let value = self.children[winning_idx].value();

        while let Some(next_top) = self.heap.peek() {
            if next_top.key != winning_key {
                break;
            }
            let shadowed = self.heap.pop().expect("peeked Some");
            let _ = self.step(shadowed.child_idx);
            self.push_if_valid(shadowed.child_idx);
        }

        self.current = Some((winning_key, value));
        self.current_idx = Some(winning_idx);
    }

    fn step(&mut self, idx: usize) -> Result<(), TableError> {
        if self.reverse {
            self.children[idx].prev()
        } else {
            self.children[idx].next()
        }
    }
}

impl TableIter for MergeIterator {
    fn rewind(&mut self) -> Result<(), TableError> {
        for child in &mut self.children {
            child.rewind()?;
        }
        self.rebuild_heap();
        Ok(())
    }

    fn rewind_to_last(&mut self) -> Result<(), TableError> {
        for child in &mut self.children {
            child.rewind_to_last()?;
        }
        self.rebuild_heap();
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<(), TableError> {
        for child in &mut self.children {
            child.seek(target)?;
        }
        self.rebuild_heap();
        Ok(())
    }

    fn seek_for_prev(&mut self, target: &[u8]) -> Result<(), TableError> {
        for child in &mut self.children {
            child.seek_for_prev(target)?;
        }
        self.rebuild_heap();
        Ok(())
    }

    fn next(&mut self) -> Result<(), TableError> {
        if let Some(idx) = self.current_idx {
            self.step(idx)?;
            self.push_if_valid(idx);
        }
        self.establish_current();
        Ok(())
    }

    fn prev(&mut self) -> Result<(), TableError> {
        // `prev` is only meaningful when `reverse` is false and the caller
        // wants to step backward manually (e.g. seek-for-prev correction);
        // it mirrors `next`'s bookkeeping but steps the opposite primitive.
        if let Some(idx) = self.current_idx {
            if self.reverse {
                self.children[idx].next()?;
            } else {
                self.children[idx].prev()?;
            }
            self.push_if_valid(idx);
        }
        self.establish_current();
        Ok(())
    }

    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn key(&self) -> Vec<u8> {
        self.current.as_ref().map(|(k, _)| k.clone()).unwrap_or_default()
    }

    fn value(&self) -> ValueStruct {
        self.current
            .as_ref()
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| ValueStruct::inline(0, Vec::new()))
    }
}
