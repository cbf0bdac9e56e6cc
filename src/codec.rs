//! Symmetric gzip compression hook for `StreamInfo::compressed`.
//!
//! Compression, when it takes effect, runs as a whole-buffer transform ahead
//! of hashing: the append pipeline hashes and stores exactly the bytes this
//! module produces, so `StreamMetadata::hash`/`length` always describe the
//! stored (possibly compressed) representation. See `DESIGN.md` for why the
//! length/hash validation against caller-supplied hints is scoped
//! accordingly.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Gzip-compress `data` in full, returning the compressed bytes.
pub fn compress(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Wrap `inner` in a gzip-decompressing transform, for a retrieval whose
/// metadata records `compressed = true`.
pub fn decompressing_reader<R: Read + Send + 'static>(inner: R) -> Box<dyn Read + Send> {
    Box::new(GzDecoder::new(inner))
}
