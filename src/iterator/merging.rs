//! Merging iterator over N sorted child streams.
//!
//! Presents the multiset union of its children as one sorted cursor.
//! The invariant maintained between operations: while valid, the
//! current child is positioned at the overall minimum key (moving
//! forward) or maximum key (moving reverse) among valid children.
//! Non-current children are only re-anchored when the direction
//! changes.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::util::comparator::Comparator;
use crate::Result;

use super::{CleanupFn, CleanupList, EmptyIterator, IteratorDirection, StorageIterator};

/// Create an iterator over the union of `children`.
///
/// The result yields every entry of every child in `comparator` order.
/// Children must each be sorted under the same comparator. When two
/// children hold equal keys, the lower-indexed child is yielded first
/// in forward order and last in reverse order.
pub fn new_merging_iterator(
    comparator: Arc<dyn Comparator>,
    mut children: Vec<Box<dyn StorageIterator>>,
) -> Box<dyn StorageIterator> {
    match children.len() {
        0 => Box::new(EmptyIterator::new()),
        1 => children.pop().unwrap(),
        _ => Box::new(MergingIterator {
            comparator,
            children,
            current: None,
            direction: IteratorDirection::Forward,
            cleanups: CleanupList::default(),
        }),
    }
}

struct MergingIterator {
    comparator: Arc<dyn Comparator>,
    children: Vec<Box<dyn StorageIterator>>,
    /// Index of the child the cursor delegates to, if any child is valid.
    current: Option<usize>,
    direction: IteratorDirection,
    cleanups: CleanupList,
}

impl MergingIterator {
    /// Point `current` at the valid child with the smallest key.
    /// Ascending scan with strict `<`, so the lowest index wins ties.
    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for i in 0..self.children.len() {
            if !self.children[i].valid() {
                continue;
            }
            smallest = match smallest {
                None => Some(i),
                Some(s) => {
                    if self
                        .comparator
                        .compare(self.children[i].key(), self.children[s].key())
                        == Ordering::Less
                    {
                        Some(i)
                    } else {
                        Some(s)
                    }
                }
            };
        }
        self.current = smallest;
    }

    /// Point `current` at the valid child with the largest key.
    /// Descending scan with strict `>`, so the highest index wins ties.
    fn find_largest(&mut self) {
        let mut largest: Option<usize> = None;
        for i in (0..self.children.len()).rev() {
            if !self.children[i].valid() {
                continue;
            }
            largest = match largest {
                None => Some(i),
                Some(l) => {
                    if self
                        .comparator
                        .compare(self.children[i].key(), self.children[l].key())
                        == Ordering::Greater
                    {
                        Some(i)
                    } else {
                        Some(l)
                    }
                }
            };
        }
        self.current = largest;
    }
}

impl StorageIterator for MergingIterator {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        for child in &mut self.children {
            child.seek_to_first();
        }
        self.find_smallest();
        self.direction = IteratorDirection::Forward;
    }

    fn seek_to_last(&mut self) {
        for child in &mut self.children {
            child.seek_to_last();
        }
        self.find_largest();
        self.direction = IteratorDirection::Reverse;
    }

    fn seek(&mut self, target: &[u8]) {
        for child in &mut self.children {
            child.seek(target);
        }
        self.find_smallest();
        self.direction = IteratorDirection::Forward;
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        let current = self.current.expect("next() on an invalid iterator");

        // When switching out of reverse, every non-current child sits
        // at or before key(); move each strictly after it so the
        // minimum computation is meaningful again.
        if self.direction != IteratorDirection::Forward {
            let key = self.children[current].key().to_vec();
            for i in 0..self.children.len() {
                if i == current {
                    continue;
                }
                let child = &mut self.children[i];
                child.seek(&key);
                if child.valid() && self.comparator.compare(&key, child.key()) == Ordering::Equal
                {
                    child.next();
                }
            }
            self.direction = IteratorDirection::Forward;
        }

        self.children[current].next();
        self.find_smallest();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        let current = self.current.expect("prev() on an invalid iterator");

        // Symmetric to next(): re-anchor every non-current child
        // strictly before key().
        if self.direction != IteratorDirection::Reverse {
            let key = self.children[current].key().to_vec();
            for i in 0..self.children.len() {
                if i == current {
                    continue;
                }
                let child = &mut self.children[i];
                child.seek(&key);
                if child.valid() {
                    // Child is at the first entry >= key(); step back
                    // to be strictly before it.
                    child.prev();
                } else {
                    // Child has no entries >= key(); its last entry is
                    // before key().
                    child.seek_to_last();
                }
            }
            self.direction = IteratorDirection::Reverse;
        }

        self.children[current].prev();
        self.find_largest();
    }

    fn key(&self) -> &[u8] {
        let current = self.current.expect("key() on an invalid iterator");
        self.children[current].key()
    }

    fn value(&self) -> &[u8] {
        let current = self.current.expect("value() on an invalid iterator");
        self.children[current].value()
    }

    fn status(&self) -> Result<()> {
        for child in &self.children {
            child.status()?;
        }
        Ok(())
    }

    fn register_cleanup(&mut self, cleanup: CleanupFn) {
        self.cleanups.push(cleanup);
    }
}
