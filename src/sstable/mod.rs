//! Sorted string tables: immutable on-disk files of sorted key-value
//! pairs.
//!
//! # File Format
//!
//! ```text
//! +------------------+
//! | Data Block 1     |
//! +------------------+
//! | ...              |
//! +------------------+
//! | Data Block N     |
//! +------------------+
//! | Index Block      |  (separator key -> data block handle)
//! +------------------+
//! | Footer           |  (index block handle + magic)
//! +------------------+
//! ```
//!
//! Each block carries a 5-byte trailer: a masked CRC32 of the block
//! contents plus compression tag, then the tag byte itself.

mod block;
mod block_builder;
mod reader;
mod writer;

pub use block::{Block, BlockHandle, BlockIter};
pub use block_builder::BlockBuilder;
pub use reader::Table;
pub use writer::TableWriter;

use bytes::BytesMut;

use crate::util::coding::{decode_fixed64, encode_fixed64};
use crate::{Error, Result};

/// Magic number identifying a valid table footer.
pub const FOOTER_MAGIC: u64 = 0x8fe61d59c2b741a6;

/// Footer size: index handle (16) + magic (8) = 24 bytes.
pub const FOOTER_SIZE: usize = BlockHandle::encoded_size() + 8;

/// Block trailer size: CRC (4) + compression tag (1) = 5 bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Footer of a table file, pointing at the index block.
#[derive(Debug, Clone)]
pub struct Footer {
    /// Handle to the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Create a new footer.
    pub fn new(index_handle: BlockHandle) -> Self {
        Self { index_handle }
    }

    /// Encode the footer to bytes.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE);
        self.index_handle.encode_to(&mut buf);
        encode_fixed64(&mut buf, FOOTER_MAGIC);
        buf
    }

    /// Decode a footer from exactly [`FOOTER_SIZE`] bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::corruption("footer too short"));
        }

        let mut cursor = &data[data.len() - FOOTER_SIZE..];
        let index_handle = BlockHandle::decode(&mut cursor)?;
        let magic =
            decode_fixed64(&mut cursor).ok_or_else(|| Error::corruption("footer too short"))?;
        if magic != FOOTER_MAGIC {
            return Err(Error::corruption("invalid footer magic"));
        }

        Ok(Self { index_handle })
    }
}
