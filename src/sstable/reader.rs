//! Table reader: parsed footer and index over a random-access file.
//!
//! A `Table` is the unit the table cache memoizes. Opening one reads
//! and verifies the footer and the index block; data blocks are read
//! lazily on lookup or scan, optionally through a shared block cache.

use std::sync::Arc;

use bytes::BytesMut;

use crate::env::RandomAccessFile;
use crate::iterator::{CleanupFn, CleanupList, StorageIterator};
use crate::options::{Options, ReadOptions};
use crate::util::coding::encode_fixed64;
use crate::{Error, Result};

use super::block::{Block, BlockHandle, BlockIter};
use super::{Footer, FOOTER_SIZE};

/// An open, parsed table file.
///
/// Cheap to share; all reads go through positioned I/O on the owned
/// file, so a single `Table` serves many threads.
pub struct Table {
    options: Arc<Options>,
    file: Arc<dyn RandomAccessFile>,
    index_block: Arc<Block>,
    /// Prefix for block-cache keys, drawn from the shared cache so
    /// blocks of different tables never collide.
    cache_id: u64,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("cache_id", &self.cache_id)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Open a table from a file of `file_size` bytes.
    ///
    /// Reads the footer and index block; fails with a corruption
    /// error if either does not parse.
    pub fn open(
        options: Arc<Options>,
        file: Arc<dyn RandomAccessFile>,
        file_size: u64,
    ) -> Result<Table> {
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small for footer"));
        }

        let footer_raw = file.read_at(file_size - FOOTER_SIZE as u64, FOOTER_SIZE)?;
        let footer = Footer::decode(&footer_raw)?;

        let index_raw = file.read_at(
            footer.index_handle.offset(),
            footer.index_handle.size() as usize,
        )?;
        let index_block = Arc::new(Block::from_raw(&index_raw, true)?);

        let cache_id = match &options.block_cache {
            Some(cache) => cache.new_id(),
            None => 0,
        };

        Ok(Self {
            options,
            file,
            index_block,
            cache_id,
        })
    }

    /// Read a data block, consulting the block cache when configured.
    fn read_block(&self, handle: &BlockHandle, read_options: &ReadOptions) -> Result<Arc<Block>> {
        let cache = match &self.options.block_cache {
            Some(cache) => cache,
            None => {
                let raw = self.file.read_at(handle.offset(), handle.size() as usize)?;
                return Ok(Arc::new(Block::from_raw(&raw, read_options.verify_checksums)?));
            }
        };

        let mut key = BytesMut::with_capacity(16);
        encode_fixed64(&mut key, self.cache_id);
        encode_fixed64(&mut key, handle.offset());

        if let Some(cache_handle) = cache.lookup(&key) {
            let block = cache.value(&cache_handle);
            cache.release(cache_handle);
            return Ok(block);
        }

        let raw = self.file.read_at(handle.offset(), handle.size() as usize)?;
        let block = Arc::new(Block::from_raw(&raw, read_options.verify_checksums)?);
        if read_options.fill_cache {
            let cache_handle = cache.insert(&key, Arc::clone(&block), block.size() as u64, None);
            cache.release(cache_handle);
        }
        Ok(block)
    }

    /// Point lookup.
    ///
    /// Positions on the first entry at or after `key` and, if one
    /// exists in the candidate block, invokes `saver` with its key and
    /// value. The caller decides whether the entry matches.
    pub fn internal_get(
        &self,
        read_options: &ReadOptions,
        key: &[u8],
        saver: &mut dyn FnMut(&[u8], &[u8]),
    ) -> Result<()> {
        let mut index_iter = BlockIter::new(
            Arc::clone(&self.index_block),
            Arc::clone(&self.options.comparator),
        );
        index_iter.seek(key);
        if !index_iter.valid() {
            return index_iter.status();
        }

        let mut handle_bytes = index_iter.value();
        let handle = BlockHandle::decode(&mut handle_bytes)?;
        let block = self.read_block(&handle, read_options)?;

        let mut block_iter = BlockIter::new(block, Arc::clone(&self.options.comparator));
        block_iter.seek(key);
        if block_iter.valid() {
            saver(block_iter.key(), block_iter.value());
        }
        block_iter.status()
    }

    /// Create a scan iterator over the whole table.
    pub fn new_iterator(self: Arc<Self>, read_options: &ReadOptions) -> Box<dyn StorageIterator> {
        Box::new(TableIterator::new(self, *read_options))
    }
}

/// Two-level iterator: the index block points at data blocks, which
/// are loaded lazily and iterated in either direction.
struct TableIterator {
    table: Arc<Table>,
    read_options: ReadOptions,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    /// Offset of the block `data_iter` is over, to skip reloads.
    data_block_offset: Option<u64>,
    status: Option<Error>,
    cleanups: CleanupList,
}

impl TableIterator {
    fn new(table: Arc<Table>, read_options: ReadOptions) -> Self {
        let index_iter = BlockIter::new(
            Arc::clone(&table.index_block),
            Arc::clone(&table.options.comparator),
        );
        Self {
            table,
            read_options,
            index_iter,
            data_iter: None,
            data_block_offset: None,
            status: None,
            cleanups: CleanupList::default(),
        }
    }

    /// Load the data block for the current index entry.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.data_iter = None;
            self.data_block_offset = None;
            return;
        }

        let mut handle_bytes = self.index_iter.value();
        let handle = match BlockHandle::decode(&mut handle_bytes) {
            Ok(handle) => handle,
            Err(e) => {
                self.status.get_or_insert(e);
                self.data_iter = None;
                self.data_block_offset = None;
                return;
            }
        };

        if self.data_block_offset == Some(handle.offset()) {
            return; // data_iter already over this block
        }

        match self.table.read_block(&handle, &self.read_options) {
            Ok(block) => {
                self.data_iter = Some(BlockIter::new(
                    block,
                    Arc::clone(&self.table.options.comparator),
                ));
                self.data_block_offset = Some(handle.offset());
            }
            Err(e) => {
                self.status.get_or_insert(e);
                self.data_iter = None;
                self.data_block_offset = None;
            }
        }
    }

    fn data_valid(&self) -> bool {
        self.data_iter.as_ref().is_some_and(|d| d.valid())
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                self.data_block_offset = None;
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(d) = &mut self.data_iter {
                d.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while !self.data_valid() {
            if !self.index_iter.valid() {
                self.data_iter = None;
                self.data_block_offset = None;
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(d) = &mut self.data_iter {
                d.seek_to_last();
            }
        }
    }
}

impl StorageIterator for TableIterator {
    fn valid(&self) -> bool {
        self.data_valid()
    }

    fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(d) = &mut self.data_iter {
            d.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(d) = &mut self.data_iter {
            d.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(d) = &mut self.data_iter {
            d.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    fn next(&mut self) {
        debug_assert!(self.valid());
        if let Some(d) = &mut self.data_iter {
            d.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid());
        if let Some(d) = &mut self.data_iter {
            d.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn key(&self) -> &[u8] {
        self.data_iter
            .as_ref()
            .expect("key() on an invalid iterator")
            .key()
    }

    fn value(&self) -> &[u8] {
        self.data_iter
            .as_ref()
            .expect("value() on an invalid iterator")
            .value()
    }

    fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(d) = &self.data_iter {
            d.status()?;
        }
        match &self.status {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn register_cleanup(&mut self, cleanup: CleanupFn) {
        self.cleanups.push(cleanup);
    }
}
