//! MD5 hashing wrapper — composes hashing and transfer into a single pass
//! over the producer's source stream, per the append pipeline's admission
//! step 7.

use md5::{Digest, Md5};
use std::io::{self, Read};

/// Wraps a `Read` so every byte that passes through also feeds an MD5
/// hasher. Used by the append pipeline to compute `StreamMetadata::hash`
/// without a second pass over the data.
pub struct HashingReader<R: Read> {
    inner: R,
    hasher: Md5,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consume the wrapper and finalize the running MD5 digest.
    pub fn finalize(self) -> [u8; 16] {
        self.hasher.finalize().into()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
            self.bytes_read += n as u64;
        }
        Ok(n)
    }
}
