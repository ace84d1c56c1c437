//! Block builder for constructing table data blocks.
//!
//! Builds blocks with prefix compression and restart points.

use bytes::{BufMut, Bytes, BytesMut};

use crate::options::Compression;
use crate::util::coding::{encode_fixed32, encode_varint64};
use crate::util::crc::{crc32_multi, mask_crc};

use super::BLOCK_TRAILER_SIZE;

/// Builder for table blocks.
///
/// Keys must be added in ascending order; the caller enforces the
/// ordering under its comparator. Every `restart_interval` entries the
/// builder emits the full key instead of a shared-prefix delta.
pub struct BlockBuilder {
    /// Buffer for block data.
    buffer: BytesMut,
    /// Restart point offsets.
    restarts: Vec<u32>,
    /// Number of entries since the last restart.
    counter: usize,
    /// Restart interval.
    restart_interval: usize,
    /// Last key added (for prefix compression).
    last_key: Vec<u8>,
    /// Whether finish has been called.
    finished: bool,
    /// Target block size.
    block_size: usize,
}

impl BlockBuilder {
    /// Create a new block builder.
    pub fn new(block_size: usize, restart_interval: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(block_size),
            restarts: vec![0],
            counter: 0,
            restart_interval,
            last_key: Vec::new(),
            finished: false,
            block_size,
        }
    }

    /// Add a key-value pair to the block.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);

        // Shared prefix with the previous key, or a fresh restart
        let shared = if self.counter < self.restart_interval {
            let mut shared = 0;
            let min_len = std::cmp::min(self.last_key.len(), key.len());
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
            shared
        } else {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let unshared = key.len() - shared;

        // Entry: shared_len | unshared_len | value_len | key_delta | value
        encode_varint64(&mut self.buffer, shared as u64);
        encode_varint64(&mut self.buffer, unshared as u64);
        encode_varint64(&mut self.buffer, value.len() as u64);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Check if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the current estimated size of the finished block.
    pub fn current_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4 + BLOCK_TRAILER_SIZE
    }

    /// Check if the block has reached its target size.
    pub fn should_flush(&self) -> bool {
        self.current_size() >= self.block_size
    }

    /// Finish building and return the block contents without trailer.
    pub fn finish(&mut self) -> Bytes {
        debug_assert!(!self.finished);
        self.finished = true;

        let restarts = std::mem::take(&mut self.restarts);
        for &restart in &restarts {
            encode_fixed32(&mut self.buffer, restart);
        }
        encode_fixed32(&mut self.buffer, restarts.len() as u32);
        self.restarts = restarts;

        self.buffer.clone().freeze()
    }

    /// Finish, compress, and append the trailer (CRC + tag).
    pub fn finish_with_trailer(&mut self, compression: Compression) -> Bytes {
        let content = self.finish();

        let (final_content, final_compression) = match compression {
            Compression::None => (content, Compression::None),
            Compression::Snappy => match snap::raw::Encoder::new().compress_vec(&content) {
                Ok(compressed) if compressed.len() < content.len() => {
                    (Bytes::from(compressed), Compression::Snappy)
                }
                // Compression didn't help or failed; store raw
                _ => (content, Compression::None),
            },
            Compression::Lz4 => {
                let compressed = lz4_flex::compress_prepend_size(&content);
                if compressed.len() < content.len() {
                    (Bytes::from(compressed), Compression::Lz4)
                } else {
                    (content, Compression::None)
                }
            }
        };

        let tag = final_compression.to_byte();
        let crc = mask_crc(crc32_multi(&[&final_content, &[tag]]));

        let mut result = BytesMut::with_capacity(final_content.len() + BLOCK_TRAILER_SIZE);
        result.put_slice(&final_content);
        encode_fixed32(&mut result, crc);
        result.put_u8(tag);

        result.freeze()
    }

    /// Reset the builder for reuse.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.finished = false;
    }
}
