//! Table writer for building immutable sorted files.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use bytes::BytesMut;

use crate::options::{Compression, Options};
use crate::Result;

use super::block::BlockHandle;
use super::block_builder::BlockBuilder;
use super::Footer;

/// Writer for building table files.
///
/// Accepts key-value pairs in ascending comparator order, flushes data
/// blocks at the configured size, and finishes with an index block and
/// footer. Index entries use short separator keys so the index stays
/// small.
pub struct TableWriter {
    options: Arc<Options>,
    writer: BufWriter<File>,
    /// Current offset in the file.
    offset: u64,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    /// Last key written (for separators and order checking).
    last_key: Vec<u8>,
    /// Handle of the last flushed data block, awaiting its index
    /// entry (written once the separator key is known).
    pending_index_entry: Option<BlockHandle>,
    entry_count: u64,
}

impl TableWriter {
    /// Create a writer for a new table file at `path`.
    pub fn new(options: Arc<Options>, path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        let data_block = BlockBuilder::new(options.block_size, options.block_restart_interval);
        // Index entries are few and never share long prefixes;
        // restart every entry.
        let index_block = BlockBuilder::new(options.block_size, 1);

        Ok(Self {
            writer: BufWriter::with_capacity(options.block_size * 4, file),
            offset: 0,
            data_block,
            index_block,
            last_key: Vec::new(),
            pending_index_entry: None,
            entry_count: 0,
            options,
        })
    }

    /// Number of entries added so far.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Current file size.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// Add a key-value pair. Keys must arrive in ascending comparator
    /// order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(
            self.entry_count == 0
                || self.options.comparator.compare(&self.last_key, key) == Ordering::Less,
            "keys must be added in ascending order"
        );

        if let Some(handle) = self.pending_index_entry.take() {
            let separator = self
                .options
                .comparator
                .find_shortest_separator(&self.last_key, key);
            self.write_index_entry(&separator, handle);
        }

        self.data_block.add(key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entry_count += 1;

        if self.data_block.should_flush() {
            self.flush_data_block()?;
        }

        Ok(())
    }

    /// Finish the table: flush the last data block, write the index
    /// block and footer, and sync. Returns the final file size.
    pub fn finish(mut self) -> Result<u64> {
        self.flush_data_block()?;

        if let Some(handle) = self.pending_index_entry.take() {
            let successor = self.options.comparator.find_short_successor(&self.last_key);
            self.write_index_entry(&successor, handle);
        }

        let index_data = self.index_block.finish_with_trailer(Compression::None);
        let index_handle = self.write_raw_block(&index_data)?;

        let footer_data = Footer::new(index_handle).encode();
        self.writer.write_all(&footer_data)?;
        self.offset += footer_data.len() as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        Ok(self.offset)
    }

    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }

        let block_data = self.data_block.finish_with_trailer(self.options.compression);
        let handle = self.write_raw_block(&block_data)?;
        self.pending_index_entry = Some(handle);
        self.data_block.reset();
        Ok(())
    }

    fn write_raw_block(&mut self, data: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, data.len() as u64);
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(handle)
    }

    fn write_index_entry(&mut self, key: &[u8], handle: BlockHandle) {
        let mut value = BytesMut::with_capacity(BlockHandle::encoded_size());
        handle.encode_to(&mut value);
        self.index_block.add(key, &value);
    }
}
