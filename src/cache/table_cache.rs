//! Table cache: memoizes open table readers per file number.
//!
//! Wraps the sharded LRU cache with filename resolution (canonical
//! `.ldb`, falling back to legacy `.sst`), one-shot file open and
//! parse, and handle lifetimes tied to the iterators handed out.
//! Failed opens are never cached, so a transient failure recovers on
//! the next call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use tracing::debug;

use crate::env::open_random_access;
use crate::iterator::{EmptyIterator, StorageIterator};
use crate::options::{Options, ReadOptions};
use crate::sstable::Table;
use crate::util::coding::encode_fixed64;
use crate::util::filename::{legacy_table_file_path, table_file_path};
use crate::Result;

use super::lru::{Handle, LruCache};

/// Cache of open tables, keyed by file number.
pub struct TableCache {
    db_path: PathBuf,
    options: Arc<Options>,
    cache: Arc<LruCache<Arc<Table>>>,
}

impl TableCache {
    /// Create a table cache holding up to `entries` open tables for
    /// the database at `db_path`.
    pub fn new(db_path: impl AsRef<Path>, options: Arc<Options>, entries: u64) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            options,
            cache: Arc::new(LruCache::new(entries)),
        }
    }

    fn cache_key(file_number: u64) -> BytesMut {
        let mut key = BytesMut::with_capacity(8);
        encode_fixed64(&mut key, file_number);
        key
    }

    /// Find the open table for `file_number`, opening and caching it
    /// on a miss. The returned handle pins the table.
    fn find(&self, file_number: u64, file_size: u64) -> Result<Handle> {
        let key = Self::cache_key(file_number);
        if let Some(handle) = self.cache.lookup(&key) {
            return Ok(handle);
        }

        // Open and parse outside any cache lock.
        let primary = table_file_path(&self.db_path, file_number);
        let file = match open_random_access(&primary) {
            Ok(file) => {
                debug!(file_number, path = %primary.display(), "opened table file");
                file
            }
            Err(primary_err) => {
                let legacy = legacy_table_file_path(&self.db_path, file_number);
                match open_random_access(&legacy) {
                    Ok(file) => {
                        debug!(file_number, path = %legacy.display(), "opened legacy table file");
                        file
                    }
                    Err(_) => return Err(primary_err),
                }
            }
        };

        let table = Table::open(Arc::clone(&self.options), file, file_size)?;
        Ok(self.cache.insert(&key, Arc::new(table), 1, None))
    }

    /// Create a scan iterator over one table file.
    ///
    /// The cache entry stays pinned until the iterator is dropped. If
    /// the table cannot be opened, the returned iterator is empty and
    /// reports the failure from `status`.
    pub fn new_iterator(
        &self,
        read_options: &ReadOptions,
        file_number: u64,
        file_size: u64,
    ) -> Box<dyn StorageIterator> {
        let handle = match self.find(file_number, file_size) {
            Ok(handle) => handle,
            Err(e) => return Box::new(EmptyIterator::with_error(e)),
        };

        let table = self.cache.value(&handle);
        let mut iter = table.new_iterator(read_options);
        let cache = Arc::clone(&self.cache);
        iter.register_cleanup(Box::new(move || cache.release(handle)));
        iter
    }

    /// Point lookup in one table file.
    ///
    /// `saver` receives the first entry at or after `key`, if the
    /// candidate block holds one; the caller decides whether it
    /// matches.
    pub fn get(
        &self,
        read_options: &ReadOptions,
        file_number: u64,
        file_size: u64,
        key: &[u8],
        saver: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<()> {
        let handle = self.find(file_number, file_size)?;
        let table = self.cache.value(&handle);
        let result = table.internal_get(read_options, key, saver);
        self.cache.release(handle);
        result
    }

    /// Drop the cache entry for a table file, e.g. after compaction
    /// deletes it. Iterators still scanning the table keep it open.
    pub fn evict(&self, file_number: u64) {
        self.cache.erase(&Self::cache_key(file_number));
    }
}
