//! Block format for table data storage.
//!
//! A block contains a sequence of key-value entries with prefix
//! compression, followed by an array of restart points. Entries at a
//! restart point store their key in full, which makes binary search
//! and backward iteration possible.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::iterator::{CleanupFn, CleanupList, StorageIterator};
use crate::options::Compression;
use crate::util::coding::{decode_fixed32, decode_fixed64, decode_varint64, encode_fixed64};
use crate::util::comparator::Comparator;
use crate::util::crc::{crc32_multi, unmask_crc};
use crate::{Error, Result};

use super::BLOCK_TRAILER_SIZE;

/// Handle to a block within a table file.
///
/// Contains the offset and size needed to read the block; the size
/// includes the block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    /// Create a new block handle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Encode to buffer (fixed 16 bytes: offset + size).
    pub fn encode_to(&self, buf: &mut BytesMut) {
        encode_fixed64(buf, self.offset);
        encode_fixed64(buf, self.size);
    }

    /// Decode from buffer.
    pub fn decode(data: &mut &[u8]) -> Result<Self> {
        let offset =
            decode_fixed64(data).ok_or_else(|| Error::corruption("block handle too short"))?;
        let size =
            decode_fixed64(data).ok_or_else(|| Error::corruption("block handle too short"))?;
        Ok(Self { offset, size })
    }

    /// Encoded size in bytes.
    pub const fn encoded_size() -> usize {
        16
    }
}

/// An immutable, decompressed block of sorted entries.
#[derive(Debug)]
pub struct Block {
    /// Entry data followed by the restart array and the restart count.
    data: Bytes,
    /// Offset where the restart array begins.
    restart_offset: usize,
    /// Number of restart points.
    num_restarts: u32,
}

impl Block {
    /// Create a block from decompressed data (entries, restart array,
    /// restart count; no trailer).
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too short"));
        }

        let mut tail = &data[data.len() - 4..];
        let num_restarts =
            decode_fixed32(&mut tail).ok_or_else(|| Error::corruption("block too short"))?;

        let restart_array_size = num_restarts as usize * 4;
        if data.len() < 4 + restart_array_size {
            return Err(Error::corruption("block too short for restart array"));
        }

        let restart_offset = data.len() - 4 - restart_array_size;

        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Create a block from a raw on-disk read: verify the trailer CRC
    /// (when requested) and decompress.
    pub fn from_raw(raw: &[u8], verify_checksum: bool) -> Result<Self> {
        if raw.len() < BLOCK_TRAILER_SIZE {
            return Err(Error::corruption("block too short for trailer"));
        }

        let content_len = raw.len() - BLOCK_TRAILER_SIZE;
        let content = &raw[..content_len];
        let mut trailer = &raw[content_len..];

        let stored_crc = decode_fixed32(&mut trailer)
            .ok_or_else(|| Error::corruption("block trailer too short"))?;
        let tag = trailer[0];

        if verify_checksum && unmask_crc(stored_crc) != crc32_multi(&[content, &[tag]]) {
            return Err(Error::corruption("block checksum mismatch"));
        }

        let data = match Compression::from_byte(tag) {
            Some(Compression::None) => Bytes::copy_from_slice(content),
            Some(Compression::Snappy) => {
                let decompressed = snap::raw::Decoder::new()
                    .decompress_vec(content)
                    .map_err(|e| Error::corruption(format!("snappy decompress failed: {}", e)))?;
                Bytes::from(decompressed)
            }
            Some(Compression::Lz4) => {
                let decompressed = lz4_flex::decompress_size_prepended(content)
                    .map_err(|e| Error::corruption(format!("lz4 decompress failed: {}", e)))?;
                Bytes::from(decompressed)
            }
            None => {
                return Err(Error::corruption("unknown compression type"));
            }
        };

        Self::new(data)
    }

    /// Decompressed size in bytes, used as the block-cache charge.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Get a restart point offset.
    fn restart_point(&self, index: u32) -> u32 {
        let offset = self.restart_offset + (index as usize * 4);
        let mut cursor = &self.data[offset..offset + 4];
        decode_fixed32(&mut cursor).expect("restart array bounds checked at construction")
    }

    /// Key stored at a restart point. Restart entries share no prefix,
    /// so the key is a contiguous slice of the data.
    fn restart_key(&self, index: u32) -> Option<&[u8]> {
        let offset = self.restart_point(index) as usize;
        if offset >= self.restart_offset {
            return None;
        }

        let mut cursor = &self.data[offset..self.restart_offset];
        let before = cursor.len();
        let shared = decode_varint64(&mut cursor)?;
        let unshared = decode_varint64(&mut cursor)? as usize;
        let _value_len = decode_varint64(&mut cursor)?;
        if shared != 0 || cursor.len() < unshared {
            return None;
        }

        let key_start = offset + (before - cursor.len());
        Some(&self.data[key_start..key_start + unshared])
    }
}

/// Bidirectional iterator over the entries of one block.
pub struct BlockIter {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current entry in the block data.
    current: usize,
    /// Offset just past the current entry (next parse position).
    next_offset: usize,
    /// Index of the restart section containing `current`.
    restart_index: u32,
    /// Current key, reassembled from shared prefixes.
    key: Vec<u8>,
    /// Current value, a zero-copy slice of the block data.
    value: Bytes,
    valid: bool,
    status: Option<Error>,
    cleanups: CleanupList,
}

impl BlockIter {
    pub fn new(block: Arc<Block>, comparator: Arc<dyn Comparator>) -> Self {
        let restart_offset = block.restart_offset;
        let num_restarts = block.num_restarts;
        Self {
            block,
            comparator,
            current: restart_offset,
            next_offset: restart_offset,
            restart_index: num_restarts,
            key: Vec::new(),
            value: Bytes::new(),
            valid: false,
            status: None,
            cleanups: CleanupList::default(),
        }
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        self.next_offset = self.block.restart_point(index) as usize;
        self.valid = false;
    }

    fn mark_exhausted(&mut self) {
        self.valid = false;
        self.current = self.block.restart_offset;
        self.next_offset = self.block.restart_offset;
        self.restart_index = self.block.num_restarts;
    }

    fn corruption_error(&mut self) -> bool {
        self.status
            .get_or_insert_with(|| Error::corruption("bad entry in block"));
        self.mark_exhausted();
        self.key.clear();
        self.value = Bytes::new();
        false
    }

    /// Parse the entry at `next_offset`, making it current.
    fn parse_next_key(&mut self) -> bool {
        self.current = self.next_offset;
        if self.current >= self.block.restart_offset {
            self.mark_exhausted();
            return false;
        }

        let mut cursor = &self.block.data[self.current..self.block.restart_offset];
        let before = cursor.len();

        let header = (
            decode_varint64(&mut cursor),
            decode_varint64(&mut cursor),
            decode_varint64(&mut cursor),
        );
        let (shared, unshared, value_len) = match header {
            (Some(s), Some(u), Some(v)) => (s as usize, u as usize, v as usize),
            _ => return self.corruption_error(),
        };

        if shared > self.key.len() || cursor.len() < unshared + value_len {
            return self.corruption_error();
        }

        let header_len = before - cursor.len();
        self.key.truncate(shared);
        self.key.extend_from_slice(&cursor[..unshared]);

        let value_start = self.current + header_len + unshared;
        self.value = self.block.data.slice(value_start..value_start + value_len);
        self.next_offset = value_start + value_len;

        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current as u32
        {
            self.restart_index += 1;
        }

        self.valid = true;
        true
    }
}

impl StorageIterator for BlockIter {
    fn valid(&self) -> bool {
        self.valid
    }

    fn seek_to_first(&mut self) {
        self.seek_to_restart_point(0);
        self.parse_next_key();
    }

    fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.mark_exhausted();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        while self.parse_next_key() && self.next_offset < self.block.restart_offset {}
    }

    fn seek(&mut self, target: &[u8]) {
        // Binary search over restart points for the last restart whose
        // key is strictly before the target, then scan linearly.
        let mut left = 0u32;
        let mut right = self.block.num_restarts.saturating_sub(1);
        while left < right {
            let mid = (left + right + 1) / 2;
            match self.block.restart_key(mid) {
                Some(key) => {
                    if self.comparator.compare(key, target) == std::cmp::Ordering::Less {
                        left = mid;
                    } else {
                        right = mid - 1;
                    }
                }
                None => {
                    self.corruption_error();
                    return;
                }
            }
        }

        self.seek_to_restart_point(left);
        loop {
            if !self.parse_next_key() {
                return;
            }
            if self.comparator.compare(&self.key, target) != std::cmp::Ordering::Less {
                return;
            }
        }
    }

    fn next(&mut self) {
        debug_assert!(self.valid);
        self.parse_next_key();
    }

    fn prev(&mut self) {
        debug_assert!(self.valid);

        // Scan back to the last restart point strictly before the
        // current entry, then parse forward up to it.
        let original = self.current;
        while self.block.restart_point(self.restart_index) as usize >= original {
            if self.restart_index == 0 {
                self.mark_exhausted();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_key() && self.next_offset < original {}
    }

    fn key(&self) -> &[u8] {
        debug_assert!(self.valid);
        &self.key
    }

    fn value(&self) -> &[u8] {
        debug_assert!(self.valid);
        &self.value
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
