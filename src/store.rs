//! The store façade (component E): the single public entry point tying the
//! staging buffer, append pipeline, and index together, plus crash recovery
//! at open.

use crate::cancel::CancellationToken;
use crate::codec;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::index::{FileIndex, StreamMetadata};
use crate::pipeline::{AppendPipeline, StreamSource};
use crate::ring::CyclicStagingBuffer;
use crate::slice_stream::BoundedSliceStream;
use std::fs::OpenOptions;
use std::io::{Read, Seek};
use std::sync::Arc;

/// Caller-supplied hints validated against the stream actually transferred.
/// Any field left `None` skips that check.
#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub length: Option<u64>,
    pub hash: Option<[u8; 16]>,
    pub compressed: bool,
}

impl StreamInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_length(mut self, length: u64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_hash(mut self, hash: [u8; 16]) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }
}

/// What [`Store::get`] returns: a bounded, seekable read handle over one
/// stored stream, transparently gzip-decompressed when the record demands
/// it.
pub trait ReadSeek: Read + std::io::Seek + Send {}
impl<T: Read + std::io::Seek + Send> ReadSeek for T {}

/// The embedded append-only blob store.
pub struct Store {
    config: StoreConfig,
    index: Arc<FileIndex>,
    pipeline: Option<AppendPipeline>,
    cancel: CancellationToken,
}

impl Store {
    /// Open (or create) the store at `config.working_folder`.
    ///
    /// Crash recovery: `storage.bin` is truncated to
    /// `index.storage_written_length` if it is longer (an incomplete append
    /// thread write left trailing, un-indexed bytes). If it is *shorter*,
    /// the store is unrecoverable and `Store::open` fails with
    /// [`StoreError::Corruption`].
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.working_folder)?;

        let storage_path = config.storage_path();
        let index_path = config.index_path();

        if !storage_path.exists() {
            std::fs::File::create(&storage_path)?;
        }

        let index = FileIndex::open(&index_path)?;
        let expected_length = index.total_length();
        let actual_length = std::fs::metadata(&storage_path)?.len();

        if actual_length < expected_length {
            return Err(StoreError::Corruption(format!(
                "storage.bin is {actual_length} bytes but the index expects at least {expected_length} bytes"
            )));
        }
        if actual_length > expected_length {
            log::warn!(
                "truncating storage.bin from {actual_length} to {expected_length} bytes \
                 (recovering from an incomplete append)"
            );
            let file = OpenOptions::new().write(true).open(&storage_path)?;
            file.set_len(expected_length)?;
        }

        let block_size = config.clamped_block_size();
        let ring = Arc::new(CyclicStagingBuffer::new(block_size));
        let mut data_file = OpenOptions::new().write(true).open(&storage_path)?;
        data_file.seek(std::io::SeekFrom::Start(expected_length))?;

        let pipeline = AppendPipeline::start(data_file, ring, expected_length);

        Ok(Self {
            config,
            index: Arc::new(index),
            pipeline: Some(pipeline),
            cancel: CancellationToken::new(),
        })
    }

    /// Append `data` under `key`. Fails with `InvalidArgument` if the key is
    /// empty or already present, or if `info`'s hints don't match the
    /// transferred bytes.
    pub fn add<R: StreamSource>(
        &self,
        key: &str,
        data: R,
        info: StreamInfo,
    ) -> Result<StreamMetadata, StoreError> {
        self.add_cancellable(key, data, info, None)
    }

    /// As [`Store::add`], but the caller also supplies a per-call
    /// cancellation token. Cancellation is checked alongside the store-wide
    /// token set by [`Store::close`]; either one short-circuits the wait for
    /// durability, never the bytes already placed into the staging buffer.
    pub fn add_cancellable<R: StreamSource>(
        &self,
        key: &str,
        data: R,
        info: StreamInfo,
        cancel: Option<&CancellationToken>,
    ) -> Result<StreamMetadata, StoreError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| StoreError::InvalidArgument("store is closed".into()))?;

        let declared_length = info.length;
        let actual_length = data.stream_len().map_err(StoreError::Io)?;
        if let Some(expected) = declared_length {
            if expected != actual_length {
                return Err(StoreError::InvalidArgument(format!(
                    "declared length {expected} does not match actual stream length {actual_length}"
                )));
            }
        }
        let compressed = self.config.should_compress(info.compressed, actual_length);

        let store_cancel = self.cancel.clone();
        let call_cancel = cancel.cloned();
        let is_cancelled =
            move || store_cancel.is_cancelled() || call_cancel.as_ref().is_some_and(CancellationToken::is_cancelled);

        let result = if compressed {
            let mut buf = Vec::new();
            let mut data = data;
            data.read_to_end(&mut buf)
                .map_err(StoreError::Io)?;
            let compressed_bytes = codec::compress(&buf).map_err(StoreError::Io)?;
            pipeline.add(
                &self.index,
                key,
                std::io::Cursor::new(compressed_bytes),
                None,
                info.hash,
                true,
                is_cancelled,
            )
        } else {
            pipeline.add(&self.index, key, data, declared_length, info.hash, false, is_cancelled)
        };

        if let Ok(ref meta) = result {
            log::debug!(
                "stored key={key} offset={} length={} hash={}",
                meta.offset,
                meta.length,
                hex::encode(meta.hash)
            );
        }
        result
    }

    /// Look up `key` and return a bounded, seekable stream over its stored
    /// bytes, transparently decompressed if the record is `compressed`.
    pub fn get(&self, key: &str) -> Result<Box<dyn ReadSeek>, StoreError> {
        let meta = self
            .index
            .get(key)
            .map_err(StoreError::from)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;

        let file = std::fs::File::open(self.config.storage_path())?;
        let slice = BoundedSliceStream::new(file, meta.offset, meta.length)?;

        if meta.compressed {
            let mut buf = Vec::new();
            let mut decompressor = codec::decompressing_reader(slice);
            decompressor.read_to_end(&mut buf).map_err(StoreError::Io)?;
            Ok(Box::new(std::io::Cursor::new(buf)))
        } else {
            Ok(Box::new(slice))
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// A token producers can use to abandon a not-yet-durable `add` early.
    /// Cloning shares state with the store-wide cancellation used by
    /// `close`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Shut down cleanly: cancel in-flight admissions, drain and stop the
    /// append thread, shrink `storage.bin` to its durable length, and
    /// rewrite the index header.
    pub fn close(mut self) -> Result<(), StoreError> {
        self.shutdown_sequence()
    }

    /// The shared body of `close()` and `Drop::drop`. Takes `&mut self`
    /// rather than consuming `self` so `Drop` can call it too — a type that
    /// implements `Drop` can't have its fields moved out piecewise, which is
    /// why this reaches for `Arc::get_mut` instead of `Arc::try_unwrap`.
    fn shutdown_sequence(&mut self) -> Result<(), StoreError> {
        self.cancel.cancel();
        if let Some(pipeline) = self.pipeline.take() {
            let storage_written_length = self.index.total_length();
            pipeline.shutdown(&self.config.storage_path(), storage_written_length)?;
        }
        match Arc::get_mut(&mut self.index) {
            Some(index) => index.close_in_place()?,
            None => {
                log::warn!("index still referenced at close; header left unwritten this session");
            }
        }
        Ok(())
    }
}

impl Drop for Store {
    /// Best-effort shutdown for stores dropped without an explicit `close()`.
    /// Errors are logged rather than propagated — `Drop` has no `Result` to
    /// return them through.
    fn drop(&mut self) {
        if self.pipeline.is_none() {
            return;
        }
        if let Err(err) = self.shutdown_sequence() {
            log::error!("error shutting down store on drop: {err}");
        }
    }
}
