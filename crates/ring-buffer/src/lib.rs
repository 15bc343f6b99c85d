//! Fixed-Capacity Ring Buffer
//!
//! Provides a bounded FIFO window used for sliding per-frame statistics
//! (PERCLOS and friends). Pushing into a full window evicts the oldest entry.

mod buffer;

pub use buffer::{RingBuffer, DEFAULT_CAPACITY};
