//! Fixed-capacity rolling buffers used for short-term decibel averaging and
//! long-term loudness-ratio smoothing.

use std::collections::VecDeque;

/// What happens to the contents once a full buffer has been aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPolicy {
    /// Discard everything (non-overlapping windows)
    Clear,
    /// Discard the oldest `n` entries (sliding, overlapping windows)
    DropOldest(usize),
}

/// Values that can be averaged by a [`SamplingBuffer`]
pub trait Sample: Copy {
    fn mean(values: impl ExactSizeIterator<Item = Self>) -> Self;
}

impl Sample for f32 {
    fn mean(values: impl ExactSizeIterator<Item = Self>) -> Self {
        let count = values.len();
        if count == 0 {
            return 0.0;
        }
        values.sum::<f32>() / count as f32
    }
}

/// Ordered buffer holding at most `capacity` values.
///
/// Pushing the value that fills the buffer returns the mean of its contents
/// and then applies the drain policy, so the length never exceeds capacity.
#[derive(Debug, Clone)]
pub struct SamplingBuffer<T> {
    values: VecDeque<T>,
    capacity: usize,
    policy: DrainPolicy,
}

impl<T: Sample> SamplingBuffer<T> {
    pub fn new(capacity: usize, policy: DrainPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    /// Buffer that empties completely after every aggregate
    pub fn resetting(capacity: usize) -> Self {
        Self::new(capacity, DrainPolicy::Clear)
    }

    /// Buffer that keeps an overlap of `capacity - drop` values
    pub fn sliding(capacity: usize, drop: usize) -> Self {
        Self::new(capacity, DrainPolicy::DropOldest(drop))
    }

    /// Append a value. Returns the mean when this push filled the buffer.
    pub fn push(&mut self, value: T) -> Option<T> {
        self.values.push_back(value);
        if self.values.len() < self.capacity {
            return None;
        }

        let mean = T::mean(self.values.iter().copied());
        match self.policy {
            DrainPolicy::Clear => self.values.clear(),
            DrainPolicy::DropOldest(count) => {
                // Always free at least one slot
                let count = count.clamp(1, self.values.len());
                self.values.drain(..count);
            }
        }
        Some(mean)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.values.iter()
    }
}
