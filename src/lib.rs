//! # lsmcore
//!
//! Read-path core for an LSM-tree storage engine:
//!
//! - **Sharded LRU cache**: concurrent, reference-counted cache with
//!   per-entry charges, deleter callbacks, and strict LRU eviction
//! - **Table cache**: memoizes open table readers per file number,
//!   with legacy-filename fallback and iterator-lifetime pinning
//! - **Merging iterator**: bidirectional N-way merge of sorted
//!   streams under a comparator
//! - **Tables**: immutable sorted files with prefix-compressed,
//!   checksummed blocks, written by [`TableWriter`] and read by
//!   [`Table`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use lsmcore::{LruCache, Options, ReadOptions, TableCache};
//! use std::sync::Arc;
//!
//! // A cache of up to 100 open tables
//! let cache = TableCache::new("./db", Arc::new(Options::default()), 100);
//!
//! // Point lookup in table file 000007.ldb
//! let mut found = None;
//! cache.get(&ReadOptions::default(), 7, file_size, b"key", &mut |k, v| {
//!     if k == b"key" {
//!         found = Some(v.to_vec());
//!     }
//! })?;
//!
//! // Merge several table scans into one sorted cursor
//! let iter = lsmcore::new_merging_iterator(comparator, children);
//! ```

// Public modules
pub mod error;
pub mod options;

// Internal modules
mod cache;
mod env;
mod iterator;
mod sstable;
mod util;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{Compression, Options, ReadOptions};

// Cache
pub use cache::{Deleter, Handle, LruCache, TableCache};

// Iterators
pub use iterator::{
    new_merging_iterator, CleanupFn, EmptyIterator, IteratorDirection, StorageIterator,
};

// Tables
pub use sstable::{Block, Table, TableWriter};

// File access and key ordering
pub use env::{open_random_access, RandomAccessFile};
pub use util::comparator::{BytewiseComparator, Comparator};
