//! On-disk binary layouts for the index: [`StreamMetadata`], [`BlockInfo`],
//! [`IndexBlock`], and [`IndexHeader`].
//!
//! # Encoding
//! Every integer is little-endian. Strings are UTF-16LE; the length field
//! counts UTF-16 code units, not bytes.
//!
//! ```text
//! StreamMetadata:
//!   offset        i64  LE
//!   length        i64  LE   (sign bit = compressed; magnitude = byte length)
//!   hash          16 B      MD5 of the stored bytes
//!   key_length    i32  LE   UTF-16 code units
//!   key           key_length * 2 bytes, UTF-16LE
//!
//! BlockInfo:
//!   offset        i64  LE   (0 = "no block")
//!   length        i32  LE
//!
//! IndexBlock:
//!   next          BlockInfo
//!   count         i32  LE
//!   payload       count * StreamMetadata, key-sorted ascending
//!
//! IndexHeader (fixed, offset 0 of index.bin):
//!   storage_written_length   i64  LE
//!   index_written_length     i64  LE
//!   directory                DIRECTORY_SLOTS * BlockInfo
//! ```

use crate::error::IndexError;
use byteorder::{ByteOrder, LittleEndian};
use md5::{Digest, Md5};

/// Fixed directory slot count. Slot `i` is addressed by `hash(key) mod
/// DIRECTORY_SLOTS`.
pub const DIRECTORY_SLOTS: usize = 65535;

/// Serialized size of a [`BlockInfo`]: `i64 + i32`.
pub const BLOCK_INFO_SIZE: usize = 12;

/// Serialized size of the fixed portion of [`IndexHeader`]:
/// `2 * i64 + DIRECTORY_SLOTS * BlockInfo`.
pub const HEADER_SIZE: usize = 16 + DIRECTORY_SLOTS * BLOCK_INFO_SIZE;

// ── BlockInfo ────────────────────────────────────────────────────────────────

/// Locates a block inside `index.bin`. `offset == 0` means "no block".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockInfo {
    pub offset: u64,
    pub length: u32,
}

impl BlockInfo {
    pub const NONE: BlockInfo = BlockInfo { offset: 0, length: 0 };

    pub fn is_none(&self) -> bool {
        self.offset == 0
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let mut buf = [0u8; BLOCK_INFO_SIZE];
        LittleEndian::write_i64(&mut buf[0..8], self.offset as i64);
        LittleEndian::write_i32(&mut buf[8..12], self.length as i32);
        out.extend_from_slice(&buf);
    }

    pub fn read(buf: &[u8]) -> Self {
        let offset = LittleEndian::read_i64(&buf[0..8]) as u64;
        let length = LittleEndian::read_i32(&buf[8..12]) as u32;
        Self { offset, length }
    }
}

// ── StreamMetadata ───────────────────────────────────────────────────────────

/// Per-key persistent record. Totally ordered by [`StreamMetadata::key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetadata {
    pub key: String,
    pub offset: u64,
    pub length: u64,
    pub hash: [u8; 16],
    pub compressed: bool,
}

impl StreamMetadata {
    /// Bytes this record occupies in an [`IndexBlock`] payload:
    /// `2*i64 + 16 + i32 + 2*key_length`.
    pub fn serialized_len(&self) -> usize {
        8 + 8 + 16 + 4 + self.key.encode_utf16().count() * 2
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        let mut fixed = [0u8; 16];
        LittleEndian::write_i64(&mut fixed[0..8], self.offset as i64);
        // The sign bit encodes `compressed`; magnitude is the byte length.
        let signed_length = if self.compressed {
            -(self.length as i64)
        } else {
            self.length as i64
        };
        LittleEndian::write_i64(&mut fixed[8..16], signed_length);
        out.extend_from_slice(&fixed);
        out.extend_from_slice(&self.hash);

        let units: Vec<u16> = self.key.encode_utf16().collect();
        let mut len_buf = [0u8; 4];
        LittleEndian::write_i32(&mut len_buf, units.len() as i32);
        out.extend_from_slice(&len_buf);
        for unit in units {
            out.extend_from_slice(&unit.to_le_bytes());
        }
    }

    /// Parse one record starting at `buf[pos..]`, returning the record and
    /// the position immediately after it.
    pub fn read(buf: &[u8], pos: usize) -> Result<(Self, usize), IndexError> {
        if pos + 16 + 16 + 4 > buf.len() {
            return Err(IndexError::ShortRead { offset: pos as u64 });
        }
        let offset = LittleEndian::read_i64(&buf[pos..pos + 8]) as u64;
        let signed_length = LittleEndian::read_i64(&buf[pos + 8..pos + 16]);
        let compressed = signed_length < 0;
        let length = signed_length.unsigned_abs();

        let hash_start = pos + 16;
        let mut hash = [0u8; 16];
        hash.copy_from_slice(&buf[hash_start..hash_start + 16]);

        let key_len_start = hash_start + 16;
        let key_units = LittleEndian::read_i32(&buf[key_len_start..key_len_start + 4]) as usize;
        let key_start = key_len_start + 4;
        let key_end = key_start + key_units * 2;
        if key_end > buf.len() {
            return Err(IndexError::ShortRead { offset: pos as u64 });
        }
        let units: Vec<u16> = buf[key_start..key_end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let key = String::from_utf16_lossy(&units);

        Ok((
            StreamMetadata {
                key,
                offset,
                length,
                hash,
                compressed,
            },
            key_end,
        ))
    }
}

// ── IndexBlock ───────────────────────────────────────────────────────────────

/// A sorted, variable-length chain link: metadata records sharing one
/// directory slot, linked to the predecessor block via `next`.
#[derive(Debug, Clone, Default)]
pub struct IndexBlock {
    pub next: BlockInfo,
    pub payload: Vec<StreamMetadata>,
}

impl IndexBlock {
    pub fn serialized_len(&self) -> usize {
        BLOCK_INFO_SIZE + 4 + self.payload.iter().map(|m| m.serialized_len()).sum::<usize>()
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        self.next.write(out);
        let mut count_buf = [0u8; 4];
        LittleEndian::write_i32(&mut count_buf, self.payload.len() as i32);
        out.extend_from_slice(&count_buf);
        for m in &self.payload {
            m.write(out);
        }
    }

    pub fn read(buf: &[u8], offset: u64) -> Result<Self, IndexError> {
        if buf.len() < BLOCK_INFO_SIZE + 4 {
            return Err(IndexError::ShortRead { offset });
        }
        let next = BlockInfo::read(&buf[0..BLOCK_INFO_SIZE]);
        let count = LittleEndian::read_i32(&buf[BLOCK_INFO_SIZE..BLOCK_INFO_SIZE + 4]) as usize;

        let mut pos = BLOCK_INFO_SIZE + 4;
        let mut payload = Vec::with_capacity(count);
        for _ in 0..count {
            let (meta, next_pos) = StreamMetadata::read(buf, pos)?;
            payload.push(meta);
            pos = next_pos;
        }
        Ok(IndexBlock { next, payload })
    }

    /// Binary search the sorted payload for `key`.
    pub fn find(&self, key: &str) -> Option<&StreamMetadata> {
        self.payload
            .binary_search_by(|m| m.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.payload[i])
    }

    /// Insert `meta` into the sorted payload. Caller guarantees `meta.key`
    /// is not already present.
    pub fn insert_sorted(&mut self, meta: StreamMetadata) {
        let pos = self
            .payload
            .binary_search_by(|m| m.key.as_str().cmp(meta.key.as_str()))
            .unwrap_or_else(|i| i);
        self.payload.insert(pos, meta);
    }
}

// ── IndexHeader ──────────────────────────────────────────────────────────────

/// Fixed layout at offset 0 of `index.bin`.
#[derive(Debug, Clone)]
pub struct IndexHeader {
    pub storage_written_length: u64,
    pub index_written_length: u64,
    pub directory: Vec<BlockInfo>,
}

impl IndexHeader {
    pub fn empty() -> Self {
        Self {
            storage_written_length: 0,
            index_written_length: 0,
            directory: vec![BlockInfo::NONE; DIRECTORY_SLOTS],
        }
    }

    pub fn write(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        let mut fixed = [0u8; 16];
        LittleEndian::write_i64(&mut fixed[0..8], self.storage_written_length as i64);
        LittleEndian::write_i64(&mut fixed[8..16], self.index_written_length as i64);
        out.extend_from_slice(&fixed);
        for slot in &self.directory {
            slot.write(&mut out);
        }
        debug_assert_eq!(out.len(), HEADER_SIZE);
        out
    }

    pub fn read(buf: &[u8]) -> Result<Self, IndexError> {
        if buf.len() < HEADER_SIZE {
            return Err(IndexError::ShortRead { offset: 0 });
        }
        let storage_written_length = LittleEndian::read_i64(&buf[0..8]) as u64;
        let index_written_length = LittleEndian::read_i64(&buf[8..16]) as u64;

        let mut directory = Vec::with_capacity(DIRECTORY_SLOTS);
        let mut pos = 16;
        for _ in 0..DIRECTORY_SLOTS {
            directory.push(BlockInfo::read(&buf[pos..pos + BLOCK_INFO_SIZE]));
            pos += BLOCK_INFO_SIZE;
        }

        Ok(Self {
            storage_written_length,
            index_written_length,
            directory,
        })
    }
}

/// Slot addressing: `abs(md5(utf16_le(key)).fold(397, |s, b| (s*397) ^ b)) mod
/// DIRECTORY_SLOTS`. Frozen — distinct runs against the same files must
/// place the same key in the same slot.
pub fn slot_for_key(key: &str) -> usize {
    let utf16_bytes: Vec<u8> = key
        .encode_utf16()
        .flat_map(|u| u.to_le_bytes())
        .collect();
    let mut hasher = Md5::new();
    hasher.update(&utf16_bytes);
    let digest: [u8; 16] = hasher.finalize().into();

    let mut acc: i32 = 397;
    for b in digest {
        acc = acc.wrapping_mul(397) ^ (b as i32);
    }
    (acc.unsigned_abs() as usize) % DIRECTORY_SLOTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_info_round_trip() {
        let bi = BlockInfo { offset: 12345, length: 678 };
        let mut out = Vec::new();
        bi.write(&mut out);
        assert_eq!(out.len(), BLOCK_INFO_SIZE);
        assert_eq!(BlockInfo::read(&out), bi);
    }

    #[test]
    fn stream_metadata_round_trip_compressed_bit() {
        for compressed in [false, true] {
            let meta = StreamMetadata {
                key: "hello-key".to_string(),
                offset: 42,
                length: 1024,
                hash: [7u8; 16],
                compressed,
            };
            let mut out = Vec::new();
            meta.write(&mut out);
            assert_eq!(out.len(), meta.serialized_len());
            let (parsed, end) = StreamMetadata::read(&out, 0).unwrap();
            assert_eq!(end, out.len());
            assert_eq!(parsed, meta);
        }
    }

    #[test]
    fn stream_metadata_handles_non_ascii_keys() {
        let meta = StreamMetadata {
            key: "\u{1F600}-emoji-key".to_string(),
            offset: 0,
            length: 0,
            hash: [0u8; 16],
            compressed: false,
        };
        let mut out = Vec::new();
        meta.write(&mut out);
        let (parsed, _) = StreamMetadata::read(&out, 0).unwrap();
        assert_eq!(parsed.key, meta.key);
    }

    #[test]
    fn index_block_insert_sorted_keeps_order() {
        let mut block = IndexBlock::default();
        for key in ["charlie", "alpha", "bravo"] {
            block.insert_sorted(StreamMetadata {
                key: key.to_string(),
                offset: 0,
                length: 0,
                hash: [0u8; 16],
                compressed: false,
            });
        }
        let keys: Vec<&str> = block.payload.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn index_block_round_trip() {
        let mut block = IndexBlock {
            next: BlockInfo { offset: 99, length: 10 },
            payload: Vec::new(),
        };
        block.insert_sorted(StreamMetadata {
            key: "k1".into(),
            offset: 0,
            length: 5,
            hash: [1u8; 16],
            compressed: false,
        });
        block.insert_sorted(StreamMetadata {
            key: "k2".into(),
            offset: 5,
            length: 9,
            hash: [2u8; 16],
            compressed: true,
        });

        let mut out = Vec::new();
        block.write(&mut out);
        assert_eq!(out.len(), block.serialized_len());

        let parsed = IndexBlock::read(&out, 0).unwrap();
        assert_eq!(parsed.next, block.next);
        assert_eq!(parsed.payload.len(), 2);
        assert_eq!(parsed.find("k1").unwrap().length, 5);
        assert_eq!(parsed.find("k2").unwrap().compressed, true);
        assert!(parsed.find("missing").is_none());
    }

    #[test]
    fn header_round_trip() {
        let mut header = IndexHeader::empty();
        header.storage_written_length = 4096;
        header.index_written_length = 2048;
        header.directory[10] = BlockInfo { offset: 512, length: 64 };

        let bytes = header.write();
        assert_eq!(bytes.len(), HEADER_SIZE);

        let parsed = IndexHeader::read(&bytes).unwrap();
        assert_eq!(parsed.storage_written_length, 4096);
        assert_eq!(parsed.index_written_length, 2048);
        assert_eq!(parsed.directory[10], BlockInfo { offset: 512, length: 64 });
        assert!(parsed.directory[0].is_none());
    }

    #[test]
    fn slot_addressing_is_deterministic() {
        let a = slot_for_key("same-key");
        let b = slot_for_key("same-key");
        assert_eq!(a, b);
        assert!(a < DIRECTORY_SLOTS);
    }
}
