//! Iterator abstractions for scanning sorted key-value streams.
//!
//! All concrete iterators (block, table, merging) implement
//! [`StorageIterator`], a bidirectional cursor in the style of the
//! storage layer: positioning methods return nothing and I/O errors
//! are reported through [`StorageIterator::status`].

mod merging;

pub use merging::new_merging_iterator;

use crate::Result;

/// Direction for iterator traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorDirection {
    /// Forward iteration (ascending key order).
    Forward,
    /// Reverse iteration (descending key order).
    Reverse,
}

/// Cleanup callback run when an iterator is dropped.
pub type CleanupFn = Box<dyn FnOnce() + Send>;

/// A bidirectional cursor over a sorted stream.
///
/// After any positioning call the iterator is either valid (positioned
/// at an entry) or exhausted. `key` and `value` may only be called
/// while valid. Iterators are single-threaded; they are not safe for
/// concurrent use.
pub trait StorageIterator {
    /// Whether the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Position at the first entry.
    fn seek_to_first(&mut self);

    /// Position at the last entry.
    fn seek_to_last(&mut self);

    /// Position at the first entry with key >= target.
    fn seek(&mut self, target: &[u8]);

    /// Advance to the next entry. Requires `valid()`.
    fn next(&mut self);

    /// Step back to the previous entry. Requires `valid()`.
    fn prev(&mut self);

    /// Current key. Requires `valid()`.
    fn key(&self) -> &[u8];

    /// Current value. Requires `valid()`.
    fn value(&self) -> &[u8];

    /// First error encountered, if any.
    fn status(&self) -> Result<()>;

    /// Register a callback invoked exactly once when this iterator is
    /// dropped. Used to release resources the iterator depends on,
    /// such as a pinned cache handle.
    fn register_cleanup(&mut self, cleanup: CleanupFn);
}

/// Runs registered cleanup callbacks, in registration order, at drop.
#[derive(Default)]
pub struct CleanupList {
    cleanups: Vec<CleanupFn>,
}

impl CleanupList {
    pub fn push(&mut self, cleanup: CleanupFn) {
        self.cleanups.push(cleanup);
    }
}

impl Drop for CleanupList {
    fn drop(&mut self) {
        for cleanup in self.cleanups.drain(..) {
            cleanup();
        }
    }
}

/// An iterator over an empty stream, optionally carrying an error.
///
/// Returned where a real iterator cannot be built, e.g. when the table
/// cache fails to open a file; the failure is reported via `status`.
#[derive(Default)]
pub struct EmptyIterator {
    status: Option<crate::Error>,
    cleanups: CleanupList,
}

impl EmptyIterator {
    /// An empty iterator with an ok status.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty iterator that reports `error` from `status`.
    pub fn with_error(error: crate::Error) -> Self {
        Self {
            status: Some(error),
            cleanups: CleanupList::default(),
        }
    }
}

impl StorageIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) {}

    fn seek_to_last(&mut self) {}

    fn seek(&mut self, _target: &[u8]) {}

    fn next(&mut self) {}

    fn prev(&mut self) {}

    fn key(&self) -> &[u8] {
        panic!("key() called on an invalid iterator");
    }

    fn value(&self) -> &[u8] {
        panic!("value() called on an invalid iterator");
    }

    fn status(&self) -> Result<()> {
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn register_cleanup(&mut self, cleanup: CleanupFn) {
        self.cleanups.push(cleanup);
    }
}
