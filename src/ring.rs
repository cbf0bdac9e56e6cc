//! Cyclic staging buffer — the bounded byte ring between producer threads and
//! the append thread (component A).
//!
//! # Layout
//! A single contiguous `Vec<u8>` of `16 * block_size` bytes, read and written
//! as a ring: `write_pos` and `read_pos` wrap at `capacity`, `used` tracks the
//! number of live bytes so `free = capacity - used` without needing a
//! distinguishing sentinel between "empty" and "full".
//!
//! # Span selection
//! Every call moves at most one *contiguous* span — `min(block_size,
//! bytes_to_end_of_buffer, free_or_used_bytes)` — so callers never see a
//! torn wraparound write, and the append thread always performs large,
//! sequential writes to the data file.
//!
//! # Synchronization
//! One [`Mutex`] guards the four position fields; two [`Condvar`]s
//! (`can_read`, `can_write`) replace the source design's auto-reset events,
//! per the redesign guidance to prefer a condition-variable/mutex pair with
//! "wake all on dispose" semantics. Only one producer and one consumer are
//! ever active at a time — that invariant is enforced by the append
//! pipeline, not by this type.

use crate::error::RingError;
use std::sync::{Condvar, Mutex};

struct RingState {
    buf: Vec<u8>,
    read_pos: usize,
    write_pos: usize,
    used: usize,
    disposed: bool,
}

pub struct CyclicStagingBuffer {
    block_size: usize,
    capacity: usize,
    state: Mutex<RingState>,
    can_read: Condvar,
    can_write: Condvar,
}

impl CyclicStagingBuffer {
    /// `block_size` is the span quantum; total capacity is `16 * block_size`.
    pub fn new(block_size: usize) -> Self {
        let capacity = block_size * 16;
        Self {
            block_size,
            capacity,
            state: Mutex::new(RingState {
                buf: vec![0u8; capacity],
                read_pos: 0,
                write_pos: 0,
                used: 0,
                disposed: false,
            }),
            can_read: Condvar::new(),
            can_write: Condvar::new(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Copy up to one contiguous span from `source` into the ring. Blocks
    /// until free space is available. Returns `0` when `source` is empty or
    /// the buffer has been disposed — never blocks on an empty `source`.
    pub fn write_from(&self, source: &[u8]) -> Result<usize, RingError> {
        if source.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.lock().unwrap();
        loop {
            if state.disposed {
                return Ok(0);
            }
            let free = self.capacity - state.used;
            if free > 0 {
                break;
            }
            state = self.can_write.wait(state).unwrap();
        }

        let free = self.capacity - state.used;
        let to_end = self.capacity - state.write_pos;
        let span = self.block_size.min(to_end).min(free).min(source.len());

        let write_pos = state.write_pos;
        state.buf[write_pos..write_pos + span].copy_from_slice(&source[..span]);
        state.write_pos = (write_pos + span) % self.capacity;
        state.used += span;
        drop(state);

        self.can_read.notify_one();
        Ok(span)
    }

    /// Copy the next contiguous readable span into `sink`, flushing it.
    /// Blocks until data is available. Returns `0` only once the buffer has
    /// been disposed and fully drained.
    pub fn read_into<W: std::io::Write>(&self, sink: &mut W) -> std::io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.used > 0 {
                break;
            }
            if state.disposed {
                return Ok(0);
            }
            state = self.can_read.wait(state).unwrap();
        }

        let to_end = self.capacity - state.read_pos;
        let span = self.block_size.min(to_end).min(state.used);

        let read_pos = state.read_pos;
        let chunk = state.buf[read_pos..read_pos + span].to_vec();
        state.read_pos = (read_pos + span) % self.capacity;
        state.used -= span;
        drop(state);

        self.can_write.notify_one();

        sink.write_all(&chunk)?;
        sink.flush()?;
        Ok(span)
    }

    /// Mark the buffer disposed. Idempotent. Wakes every thread blocked in
    /// `write_from`/`read_into`; subsequent calls return `0` immediately.
    pub fn dispose(&self) {
        let mut state = self.state.lock().unwrap();
        if state.disposed {
            return;
        }
        state.disposed = true;
        drop(state);
        self.can_read.notify_all();
        self.can_write.notify_all();
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().unwrap().disposed
    }
}
