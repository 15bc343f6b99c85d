//! Bounded FIFO Window Implementation

use std::collections::VecDeque;

/// Default window capacity (150 frames = ~5 s at 30 Hz)
pub const DEFAULT_CAPACITY: usize = 150;

/// Fixed-capacity FIFO window.
///
/// The window never holds more than `capacity` entries; a push into a full
/// window drops the oldest entry first.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Entries, oldest at the front
    data: VecDeque<T>,
    /// Maximum number of entries retained
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new window with the given capacity.
    ///
    /// A zero capacity is bumped to one so the window can always report the
    /// most recent entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            data: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an entry, evicting and returning the oldest one if full
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.data.len() >= self.capacity {
            self.data.pop_front()
        } else {
            None
        };
        self.data.push_back(item);
        evicted
    }

    /// Number of entries currently held
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the window is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Count entries matching a predicate
    pub fn count_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&T) -> bool,
    {
        self.data.iter().filter(|item| predicate(item)).count()
    }

    /// Fraction of held entries matching a predicate, 0.0 when empty
    pub fn ratio_where<F>(&self, predicate: F) -> f64
    where
        F: Fn(&T) -> bool,
    {
        if self.is_empty() {
            return 0.0;
        }
        self.count_where(predicate) as f64 / self.data.len() as f64
    }

    /// Clear the window
    pub fn clear(&mut self) {
        self.data.clear();
    }
}
