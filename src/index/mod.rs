//! The on-disk index (component C): a fixed directory of 65,535 hash slots,
//! each the head of a separate-chaining block list, persisted with an
//! append-rewrite discipline and a header rewritten only at shutdown.

pub mod format;

pub use format::{slot_for_key, BlockInfo, IndexBlock, IndexHeader, StreamMetadata, DIRECTORY_SLOTS};

use crate::error::IndexError;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

/// Above this serialized chain-block size, a `Set` starts a new link instead
/// of rewriting the existing head block in place.
const MAX_BLOCK_CHAIN_BYTES: u64 = 256 * 1024 * 1024;

struct IndexState {
    file: std::fs::File,
    header: IndexHeader,
    /// True end-of-file offset for the next append. Distinct from
    /// `header.index_written_length`, which tracks only the logically
    /// reachable bytes (superseded blocks stay physically present).
    physical_len: u64,
}

/// The index over one `index.bin`. All methods take `&self` — an internal
/// mutex serializes access, matching the "index owns one file handle"
/// component boundary.
pub struct FileIndex {
    state: Mutex<IndexState>,
}

impl FileIndex {
    /// Open `path`, creating an empty index (fresh header, no blocks) if it
    /// doesn't already exist.
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let header = if is_new {
            let header = IndexHeader::empty();
            file.write_all(&header.write())?;
            header
        } else {
            let mut buf = vec![0u8; format::HEADER_SIZE];
            file.read_exact(&mut buf)?;
            IndexHeader::read(&buf)?
        };

        let physical_len = file.seek(SeekFrom::End(0))?;
        Ok(Self {
            state: Mutex::new(IndexState {
                file,
                header,
                physical_len,
            }),
        })
    }

    /// Current `storage_written_length` — the logical end of `storage.bin`
    /// and the offset the next `Set` will be assigned.
    pub fn total_length(&self) -> u64 {
        self.state.lock().unwrap().header.storage_written_length
    }

    pub fn index_written_length(&self) -> u64 {
        self.state.lock().unwrap().header.index_written_length
    }

    pub fn contains(&self, key: &str) -> bool {
        matches!(self.get(key), Ok(Some(_)))
    }

    pub fn get(&self, key: &str) -> Result<Option<StreamMetadata>, IndexError> {
        if key.is_empty() {
            return Err(IndexError::EmptyKey);
        }
        let mut state = self.state.lock().unwrap();
        let slot = slot_for_key(key);
        let mut bi = state.header.directory[slot];
        while !bi.is_none() {
            let block = Self::read_block(&mut state.file, bi)?;
            if let Some(meta) = block.find(key) {
                return Ok(Some(meta.clone()));
            }
            bi = block.next;
        }
        Ok(None)
    }

    /// Insert `meta`, rejecting duplicates. Updates `storage_written_length`
    /// by `meta.length` — callers are responsible for having already reserved
    /// `meta.offset` as the prior value of `total_length()`.
    pub fn set(&self, meta: StreamMetadata) -> Result<(), IndexError> {
        if meta.key.is_empty() {
            return Err(IndexError::EmptyKey);
        }
        let mut state = self.state.lock().unwrap();
        let slot = slot_for_key(&meta.key);
        let head_bi = state.header.directory[slot];

        let mut cursor = head_bi;
        while !cursor.is_none() {
            let block = Self::read_block(&mut state.file, cursor)?;
            if block.find(&meta.key).is_some() {
                return Err(IndexError::DuplicateKey(meta.key));
            }
            cursor = block.next;
        }

        let meta_len = meta.serialized_len() as u64;
        let stream_length = meta.length;

        let (new_block, old_length) = if !head_bi.is_none()
            && head_bi.length as u64 + meta_len < MAX_BLOCK_CHAIN_BYTES
        {
            let mut head = Self::read_block(&mut state.file, head_bi)?;
            let old_length = head_bi.length as u64;
            head.insert_sorted(meta);
            (head, old_length)
        } else {
            let mut block = IndexBlock {
                next: head_bi,
                payload: Vec::new(),
            };
            block.insert_sorted(meta);
            (block, 0)
        };

        let new_bi = Self::append_block(&mut state.file, &mut state.physical_len, &new_block)?;
        state.header.directory[slot] = new_bi;
        state.header.index_written_length =
            (state.header.index_written_length + new_bi.length as u64).saturating_sub(old_length);
        state.header.storage_written_length += stream_length;
        Ok(())
    }

    /// Advance `storage_written_length` without adding a record — used to
    /// account for bytes that already reached `storage.bin` for an admission
    /// that was ultimately rejected (declared-length mismatch, hash
    /// mismatch, or mid-transfer overrun).
    pub fn skip(&self, length: u64) -> Result<(), IndexError> {
        self.state.lock().unwrap().header.storage_written_length += length;
        Ok(())
    }

    /// Rewrite the header at offset 0. Called once, at shutdown.
    pub fn close(self) -> Result<(), IndexError> {
        let mut state = self.state.into_inner().unwrap();
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&state.header.write())?;
        Ok(())
    }

    /// Equivalent to [`FileIndex::close`], but through a mutable borrow
    /// rather than a consuming move — lets callers behind an `Arc` use
    /// `Arc::get_mut` instead of `Arc::try_unwrap`, which matters once the
    /// caller itself implements `Drop` and can no longer move its fields out.
    pub fn close_in_place(&mut self) -> Result<(), IndexError> {
        let state = self.state.get_mut().unwrap();
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&state.header.write())?;
        Ok(())
    }

    /// Reconcile `storage_written_length` with the true size of `storage.bin`
    /// after crash-recovery truncation at open.
    pub(crate) fn set_storage_written_length(&self, length: u64) {
        self.state.lock().unwrap().header.storage_written_length = length;
    }

    fn read_block(file: &mut std::fs::File, bi: BlockInfo) -> Result<IndexBlock, IndexError> {
        file.seek(SeekFrom::Start(bi.offset))?;
        let mut buf = vec![0u8; bi.length as usize];
        file.read_exact(&mut buf)
            .map_err(|_| IndexError::ShortRead { offset: bi.offset })?;
        IndexBlock::read(&buf, bi.offset)
    }

    fn append_block(
        file: &mut std::fs::File,
        physical_len: &mut u64,
        block: &IndexBlock,
    ) -> Result<BlockInfo, IndexError> {
        let mut bytes = Vec::with_capacity(block.serialized_len());
        block.write(&mut bytes);
        let offset = *physical_len;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        *physical_len += bytes.len() as u64;
        Ok(BlockInfo {
            offset,
            length: bytes.len() as u32,
        })
    }

    /// Maintenance operation: rewrite only the directory-reachable blocks
    /// into a fresh file and swap it in, reclaiming the physical space
    /// occupied by superseded chain links. Not on any hot path — callers run
    /// it as periodic housekeeping against a long-lived process.
    pub fn compact(&self, path: &Path) -> Result<(), IndexError> {
        let mut state = self.state.lock().unwrap();

        let tmp_path = path.with_extension("compact.tmp");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&vec![0u8; format::HEADER_SIZE])?;
        let mut physical_len = format::HEADER_SIZE as u64;

        let mut new_directory = vec![BlockInfo::NONE; DIRECTORY_SLOTS];
        let mut index_written_length = 0u64;

        for slot in 0..DIRECTORY_SLOTS {
            let mut chain = Vec::new();
            let mut bi = state.header.directory[slot];
            while !bi.is_none() {
                let block = Self::read_block(&mut state.file, bi)?;
                chain.extend(block.payload.into_iter());
                bi = block.next;
            }
            if chain.is_empty() {
                continue;
            }
            chain.sort_by(|a: &StreamMetadata, b: &StreamMetadata| a.key.cmp(&b.key));
            let block = IndexBlock {
                next: BlockInfo::NONE,
                payload: chain,
            };
            let written = Self::append_block(&mut tmp, &mut physical_len, &block)?;
            index_written_length += written.length as u64;
            new_directory[slot] = written;
        }

        let new_header = IndexHeader {
            storage_written_length: state.header.storage_written_length,
            index_written_length,
            directory: new_directory,
        };
        tmp.seek(SeekFrom::Start(0))?;
        tmp.write_all(&new_header.write())?;
        drop(tmp);

        std::fs::rename(&tmp_path, path)?;
        let mut reopened = OpenOptions::new().read(true).write(true).open(path)?;
        let new_physical_len = reopened.seek(SeekFrom::End(0))?;

        state.file = reopened;
        state.physical_len = new_physical_len;
        state.header = new_header;
        Ok(())
    }
}
