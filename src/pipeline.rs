//! The append pipeline (component D): one background append thread draining
//! the staging buffer into `storage.bin`, and the producer-side admission
//! path that feeds it.
//!
//! # Ticketed completion
//! A producer that has pushed all of its bytes into the ring needs to know
//! when the append thread has actually written them to disk. Rather than a
//! literal FIFO queue of wakeups, this folds the "monotone counter plus
//! threshold" idea into a single [`Condvar`]: every producer waiting on
//! [`TicketBoard::wait_for`] rechecks its own threshold against the shared
//! `processed` counter on every wakeup, which is observably equivalent to
//! waking only the tickets whose threshold has been met.
//!
//! # Fatal writes
//! A write failure on the append thread is treated as immediately fatal
//! (not retried) and completes every outstanding and future ticket with an
//! error. Distinguishing a transient disk hiccup from a permanent one isn't
//! reliably knowable from an `io::Error` alone, and failing fast is strictly
//! better than the source behavior of leaving producers parked forever.

use crate::error::StoreError;
use crate::hashing::HashingReader;
use crate::index::FileIndex;
use crate::ring::CyclicStagingBuffer;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// A byte source whose total length is known upfront, per the admission
/// requirement to validate `StreamInfo::length` before any transfer begins.
pub trait StreamSource: Read {
    fn stream_len(&self) -> io::Result<u64>;
}

impl StreamSource for &[u8] {
    fn stream_len(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl StreamSource for io::Cursor<Vec<u8>> {
    fn stream_len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

impl StreamSource for io::Cursor<&[u8]> {
    fn stream_len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

struct CompletionState {
    processed: u64,
    fatal: Option<io::ErrorKind>,
}

struct TicketBoard {
    state: Mutex<CompletionState>,
    drained: Condvar,
}

impl TicketBoard {
    fn new(initial_processed: u64) -> Self {
        Self {
            state: Mutex::new(CompletionState {
                processed: initial_processed,
                fatal: None,
            }),
            drained: Condvar::new(),
        }
    }

    fn publish(&self, processed: u64) {
        let mut state = self.state.lock().unwrap();
        if processed > state.processed {
            state.processed = processed;
        }
        drop(state);
        self.drained.notify_all();
    }

    fn fail(&self, kind: io::ErrorKind) {
        let mut state = self.state.lock().unwrap();
        state.fatal = Some(kind);
        drop(state);
        self.drained.notify_all();
    }

    fn wait_for(&self, required: u64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        while state.processed < required && state.fatal.is_none() {
            state = self.drained.wait(state).unwrap();
        }
        if let Some(kind) = state.fatal {
            return Err(StoreError::Io(io::Error::new(
                kind,
                "append thread failed permanently; durability cannot be confirmed",
            )));
        }
        Ok(())
    }
}

enum StreamFeedError {
    /// The source produced more bytes than its declared length; carries how
    /// many bytes had already been pushed into the ring (and must therefore
    /// be accounted for with `index.skip`).
    Overrun(u64),
    Io(io::Error),
    Disposed,
}

fn feed_into_ring<R: Read>(
    mut source: HashingReader<R>,
    ring: &CyclicStagingBuffer,
    pending_counter: &AtomicU64,
    max_len: Option<u64>,
) -> Result<(u64, [u8; 16]), StreamFeedError> {
    let mut chunk = vec![0u8; ring.block_size()];
    loop {
        let n = source.read(&mut chunk).map_err(StreamFeedError::Io)?;
        if n == 0 {
            break;
        }
        if let Some(max) = max_len {
            if source.bytes_read() > max {
                return Err(StreamFeedError::Overrun(source.bytes_read() - n as u64));
            }
        }
        let mut pushed = 0;
        while pushed < n {
            let k = ring
                .write_from(&chunk[pushed..n])
                .map_err(|_| StreamFeedError::Disposed)?;
            if k == 0 {
                return Err(StreamFeedError::Disposed);
            }
            pushed += k;
            pending_counter.fetch_add(k as u64, Ordering::SeqCst);
        }
    }
    Ok((source.bytes_read(), source.finalize()))
}

/// Runs the append thread and serializes producer admission through a single
/// write lock, per the append pipeline's component boundary.
pub struct AppendPipeline {
    ring: Arc<CyclicStagingBuffer>,
    write_lock: Mutex<()>,
    pending_counter: AtomicU64,
    board: Arc<TicketBoard>,
    append_thread: Option<JoinHandle<()>>,
}

impl AppendPipeline {
    /// Start the append thread against `data_file`, whose write position is
    /// already at `initial_processed` (the durable length recovered at
    /// open).
    pub fn start(
        data_file: std::fs::File,
        ring: Arc<CyclicStagingBuffer>,
        initial_processed: u64,
    ) -> Self {
        let board = Arc::new(TicketBoard::new(initial_processed));
        let ring_for_thread = Arc::clone(&ring);
        let board_for_thread = Arc::clone(&board);
        let handle = thread::spawn(move || {
            Self::append_thread_loop(data_file, ring_for_thread, board_for_thread, initial_processed)
        });
        Self {
            ring,
            write_lock: Mutex::new(()),
            pending_counter: AtomicU64::new(initial_processed),
            board,
            append_thread: Some(handle),
        }
    }

    fn append_thread_loop(
        mut data_file: std::fs::File,
        ring: Arc<CyclicStagingBuffer>,
        board: Arc<TicketBoard>,
        initial_processed: u64,
    ) {
        let mut processed = initial_processed;
        loop {
            match ring.read_into(&mut data_file) {
                Ok(0) => break,
                Ok(n) => {
                    processed += n as u64;
                    board.publish(processed);
                }
                Err(e) => {
                    log::error!("append thread write failed permanently: {e}");
                    board.fail(e.kind());
                    break;
                }
            }
        }
        let _ = data_file.flush();
    }

    /// Run one stream through admission: validate, reserve, hash-while-
    /// streaming, install, and wait for durability.
    ///
    /// `index` owns its own internal lock; this pipeline's `write_lock`
    /// additionally serializes the whole admission sequence so that offset
    /// reservation, duplicate checks, and ring submission happen as one
    /// atomic step from the perspective of other producers.
    #[allow(clippy::too_many_arguments)]
    pub fn add<R: StreamSource>(
        &self,
        index: &FileIndex,
        key: &str,
        mut data: R,
        declared_length: Option<u64>,
        declared_hash: Option<[u8; 16]>,
        compressed: bool,
        is_cancelled: impl Fn() -> bool,
    ) -> Result<crate::index::StreamMetadata, StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key is empty".into()));
        }

        let actual_declared_length = data.stream_len().map_err(StoreError::Io)?;
        if let Some(expected) = declared_length {
            if expected != actual_declared_length {
                return Err(StoreError::InvalidArgument(format!(
                    "declared length {expected} does not match actual stream length {actual_declared_length}"
                )));
            }
        }

        if is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let guard = self.write_lock.lock().unwrap();

        if index.contains(key) {
            return Err(StoreError::InvalidArgument(format!(
                "key already exists: {key}"
            )));
        }

        let offset = index.total_length();
        let hashing = HashingReader::new(&mut data);
        let max_len = if compressed { None } else { Some(actual_declared_length) };

        let (length, hash) = match feed_into_ring(hashing, &self.ring, &self.pending_counter, max_len)
        {
            Ok(pair) => pair,
            Err(StreamFeedError::Overrun(pushed)) => {
                index.skip(pushed).map_err(StoreError::from)?;
                return Err(StoreError::InvalidArgument(
                    "stream exceeded its declared length mid-transfer".into(),
                ));
            }
            Err(StreamFeedError::Io(e)) => return Err(StoreError::Io(e)),
            Err(StreamFeedError::Disposed) => return Err(StoreError::Cancelled),
        };

        if !compressed {
            if let Some(expected) = declared_length {
                if expected != length {
                    index.skip(length).map_err(StoreError::from)?;
                    return Err(StoreError::InvalidArgument(format!(
                        "declared length {expected} does not match transferred length {length}"
                    )));
                }
            }
        }
        if let Some(expected) = declared_hash {
            if expected != hash {
                index.skip(length).map_err(StoreError::from)?;
                return Err(StoreError::InvalidArgument(
                    "declared hash does not match the computed MD5 digest".into(),
                ));
            }
        }

        let meta = crate::index::StreamMetadata {
            key: key.to_string(),
            offset,
            length,
            hash,
            compressed,
        };
        index.set(meta.clone()).map_err(StoreError::from)?;

        let required = self.pending_counter.load(Ordering::SeqCst);
        drop(guard);

        if is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        self.board.wait_for(required)?;
        Ok(meta)
    }

    /// Cancel all in-flight work, drain and stop the append thread, and
    /// shrink `storage.bin` to `storage_written_length`. The caller is
    /// responsible for closing the index afterward.
    pub fn shutdown(mut self, data_file_path: &std::path::Path, storage_written_length: u64) -> io::Result<()> {
        self.ring.dispose();
        if let Some(handle) = self.append_thread.take() {
            let _ = handle.join();
        }
        let file = std::fs::OpenOptions::new().write(true).open(data_file_path)?;
        file.set_len(storage_written_length)?;
        Ok(())
    }
}
