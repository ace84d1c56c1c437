//! File access primitives.
//!
//! Table readers access files through [`RandomAccessFile`], a positioned
//! read interface that takes `&self` so that many threads can read one
//! open file without serializing behind a lock.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::{Error, Result};

/// A file that supports positioned reads from multiple threads.
pub trait RandomAccessFile: Send + Sync + std::fmt::Debug {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails with an I/O error if the range extends past the end of
    /// the file.
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes>;
}

#[cfg(unix)]
impl RandomAccessFile for File {
    fn read_at(&self, offset: u64, len: usize) -> Result<Bytes> {
        use std::os::unix::fs::FileExt;

        let mut buf = vec![0u8; len];
        self.read_exact_at(&mut buf, offset)?;
        Ok(Bytes::from(buf))
    }
}

/// Open a file for random-access reads.
///
/// A missing file maps to [`Error::NotFound`] so callers can
/// distinguish it from other I/O failures.
pub fn open_random_access(path: &Path) -> Result<Arc<dyn RandomAccessFile>> {
    match File::open(path) {
        Ok(file) => Ok(Arc::new(file)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(Error::not_found(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}
