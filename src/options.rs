//! Configuration options for lsmcore.

use std::fmt;
use std::sync::Arc;

use crate::cache::LruCache;
use crate::sstable::Block;
use crate::util::comparator::{BytewiseComparator, Comparator};

/// Default block size (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default number of entries between block restart points.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Compression algorithm for table blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    /// No compression.
    #[default]
    None = 0,
    /// Snappy compression (very fast).
    Snappy = 1,
    /// LZ4 compression (fast).
    Lz4 = 2,
}

impl Compression {
    /// Create from the on-disk tag byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Compression::None),
            1 => Some(Compression::Snappy),
            2 => Some(Compression::Lz4),
            _ => None,
        }
    }

    /// Convert to the on-disk tag byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Options controlling how tables are written and read.
#[derive(Clone)]
pub struct Options {
    /// Approximate uncompressed size of a data block.
    pub block_size: usize,
    /// Number of entries between restart points within a block.
    pub block_restart_interval: usize,
    /// Compression applied to data blocks at write time.
    pub compression: Compression,
    /// Total order over keys. The same comparator must be used to
    /// write a table and to read it back.
    pub comparator: Arc<dyn Comparator>,
    /// Optional shared cache for decompressed data blocks.
    pub block_cache: Option<Arc<LruCache<Arc<Block>>>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: Compression::None,
            comparator: Arc::new(BytewiseComparator::new()),
            block_cache: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field("comparator", &self.comparator.name())
            .field("block_cache", &self.block_cache.is_some())
            .finish()
    }
}

/// Options controlling a single read or scan.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify block checksums against the stored CRC.
    pub verify_checksums: bool,
    /// Populate the block cache with blocks read on this operation's
    /// behalf.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            fill_cache: true,
        }
    }
}
