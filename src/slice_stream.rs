//! Bounded slice stream — a read-only windowed view over the data file for
//! one retrieval (component B).
//!
//! The slice owns its inner handle: dropping the slice drops the handle,
//! matching ordinary Rust ownership rather than a separate `dispose()` call.
//! Range safety, position, and lifecycle are all enforced here, independent
//! of whatever the inner handle happens to be.

use std::io::{self, Read, Seek, SeekFrom};

/// A read-only stream whose logical position is always within `[0, length]`,
/// backed by `[offset, offset + length)` of some inner seekable handle.
pub struct BoundedSliceStream<H> {
    inner: H,
    offset: u64,
    length: u64,
    pos: u64,
}

impl<H: Read + Seek> BoundedSliceStream<H> {
    /// Construct a slice over `[offset, offset + length)` of `inner`.
    ///
    /// Fails with `UnexpectedEof` if `inner`'s length is shorter than
    /// `offset + length` — the error message distinguishes whether `offset`
    /// itself is past the end of `inner` from a merely-too-short range.
    pub fn new(mut inner: H, offset: u64, length: u64) -> io::Result<Self> {
        let file_len = inner.seek(SeekFrom::End(0))?;
        if offset > file_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("slice offset {offset} is past the end of the file ({file_len} bytes)"),
            ));
        }
        if offset + length > file_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "slice range {offset}..{} exceeds file length {file_len}",
                    offset + length
                ),
            ));
        }
        inner.seek(SeekFrom::Start(offset))?;
        Ok(Self {
            inner,
            offset,
            length,
            pos: 0,
        })
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl<H: Read + Seek> Read for BoundedSliceStream<H> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length - self.pos;
        if remaining == 0 {
            return Ok(0);
        }
        let cap = remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..cap])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<H: Read + Seek> Seek for BoundedSliceStream<H> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target: i128 = match pos {
            SeekFrom::Start(p) => p as i128,
            SeekFrom::Current(delta) => self.pos as i128 + delta as i128,
            SeekFrom::End(delta) => self.length as i128 + delta as i128,
        };
        if target < 0 || target > self.length as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek target {target} outside slice range [0, {}]", self.length),
            ));
        }
        let target = target as u64;
        self.inner.seek(SeekFrom::Start(self.offset + target))?;
        self.pos = target;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn backing(bytes: &[u8]) -> Cursor<Vec<u8>> {
        Cursor::new(bytes.to_vec())
    }

    #[test]
    fn reads_bounded_window() {
        let mut slice = BoundedSliceStream::new(backing(b"0123456789"), 2, 5).unwrap();
        let mut out = Vec::new();
        slice.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"23456");
    }

    #[test]
    fn reads_past_length_return_zero() {
        let mut slice = BoundedSliceStream::new(backing(b"0123456789"), 0, 4).unwrap();
        let mut out = [0u8; 10];
        let n1 = slice.read(&mut out).unwrap();
        assert_eq!(n1, 4);
        let n2 = slice.read(&mut out).unwrap();
        assert_eq!(n2, 0);
    }

    #[test]
    fn seek_bounds() {
        let mut slice = BoundedSliceStream::new(backing(b"0123456789"), 0, 5).unwrap();
        assert_eq!(slice.seek(SeekFrom::Start(5)).unwrap(), 5);
        assert!(slice.seek(SeekFrom::Start(6)).is_err());
        assert_eq!(slice.seek(SeekFrom::Start(0)).unwrap(), 0);
        let mut out = [0u8; 5];
        assert_eq!(slice.read(&mut out).unwrap(), 5);
        assert_eq!(&out, b"01234");
    }

    #[test]
    fn construction_rejects_range_past_end() {
        let err = BoundedSliceStream::new(backing(b"0123"), 2, 10).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn construction_rejects_offset_past_end() {
        let err = BoundedSliceStream::new(backing(b"0123"), 100, 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn empty_slice_reads_nothing() {
        let mut slice = BoundedSliceStream::new(backing(b"0123"), 2, 0).unwrap();
        let mut out = Vec::new();
        assert_eq!(slice.read(&mut out).unwrap(), 0);
        assert!(slice.is_empty());
    }
}
