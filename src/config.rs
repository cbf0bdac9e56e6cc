//! Store configuration.

use std::path::{Path, PathBuf};

/// Staging-buffer quantum bounds, see [`crate::ring::CyclicStagingBuffer`].
pub const MIN_BLOCK_SIZE: usize = 1024;
pub const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

/// Immutable configuration for one [`crate::Store`] instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding exactly two files: `storage.bin` and `index.bin`.
    pub working_folder: PathBuf,
    /// Byte threshold gating the `compressed` hook (see [`crate::codec`]):
    /// `0` means no floor, so a `compressed` request always takes effect;
    /// a positive value additionally requires the stream be longer than this
    /// many bytes.
    pub compression_threshold: u64,
    /// Staging-buffer quantum. Clamped into `[MIN_BLOCK_SIZE, MAX_BLOCK_SIZE]`
    /// rather than rejected, mirroring the teacher's `chunk_size.max(1)` style.
    pub block_size: usize,
}

impl StoreConfig {
    /// New configuration with default `compression_threshold = 0` (disabled)
    /// and `block_size = DEFAULT_BLOCK_SIZE`.
    pub fn new<P: AsRef<Path>>(working_folder: P) -> Self {
        Self {
            working_folder: working_folder.as_ref().to_owned(),
            compression_threshold: 0,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_compression_threshold(mut self, threshold: u64) -> Self {
        self.compression_threshold = threshold;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Staging-buffer quantum after clamping into the supported range.
    /// A value outside `[MIN_BLOCK_SIZE, MAX_BLOCK_SIZE]` is clamped and
    /// logged rather than rejected.
    pub(crate) fn clamped_block_size(&self) -> usize {
        let clamped = self.block_size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        if clamped != self.block_size {
            log::warn!(
                "block_size {} out of range [{}, {}], clamped to {}",
                self.block_size,
                MIN_BLOCK_SIZE,
                MAX_BLOCK_SIZE,
                clamped
            );
        }
        clamped
    }

    pub(crate) fn storage_path(&self) -> PathBuf {
        self.working_folder.join("storage.bin")
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.working_folder.join("index.bin")
    }

    /// `true` when `info.compressed` should actually take effect for a
    /// stream of the given length, per the StreamInfo options table.
    pub(crate) fn should_compress(&self, requested: bool, length: u64) -> bool {
        requested && (self.compression_threshold == 0 || length > self.compression_threshold)
    }
}
