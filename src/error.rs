//! Error types.
//!
//! Each subsystem owns a small `thiserror` enum describing its own failure
//! modes; the store façade folds all of them into [`StoreError`], whose five
//! variants are the only errors a caller of [`crate::Store`] ever sees.

use std::io;
use thiserror::Error;

/// Errors produced by the cyclic staging buffer.
#[derive(Error, Debug)]
pub enum RingError {
    #[error("staging buffer has been disposed")]
    Disposed,
}

/// Errors produced by the on-disk index (directory + block chain).
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("key is empty")]
    EmptyKey,
    #[error("key already exists: {0}")]
    DuplicateKey(String),
    #[error("short read while parsing index block at offset {offset}")]
    ShortRead { offset: u64 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// The five error kinds a [`crate::Store`] caller can observe, per the
/// store's error handling policy: invalid input, missing key, I/O failure,
/// cooperative cancellation, and unrecoverable on-disk corruption.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("key not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("store corrupted beyond recovery: {0}")]
    Corruption(String),
}

impl From<RingError> for StoreError {
    fn from(e: RingError) -> Self {
        match e {
            RingError::Disposed => StoreError::Cancelled,
        }
    }
}

impl From<IndexError> for StoreError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::EmptyKey => StoreError::InvalidArgument("key is empty".into()),
            IndexError::DuplicateKey(k) => {
                StoreError::InvalidArgument(format!("key already exists: {k}"))
            }
            IndexError::ShortRead { offset } => StoreError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short read in index block at offset {offset}"),
            )),
            IndexError::Io(e) => StoreError::Io(e),
        }
    }
}
