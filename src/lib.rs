//! # blobvault — an embedded, single-process append-only binary blob store
//!
//! A directory holding exactly two files, `storage.bin` and `index.bin`:
//! `storage.bin` is a flat, append-only concatenation of stored bytes;
//! `index.bin` maps keys to `(offset, length, hash, compressed)` records via
//! a fixed 65,535-slot hash directory with separate-chaining block lists.
//!
//! Writes are pipelined through a single background append thread behind a
//! bounded staging buffer so many producer threads can hand off data
//! concurrently while only one thread ever touches the data file. Reads are
//! lock-free, bounded slices over a freshly opened file handle.
//!
//! See [`Store`] for the public entry point.

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod hashing;
pub mod index;
pub mod pipeline;
pub mod ring;
pub mod slice_stream;
pub mod store;

pub use cancel::CancellationToken;
pub use config::{StoreConfig, DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
pub use error::{IndexError, RingError, StoreError};
pub use index::StreamMetadata;
pub use pipeline::StreamSource;
pub use store::{ReadSeek, Store, StreamInfo};
