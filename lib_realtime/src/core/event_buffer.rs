//! # Bounded Event Buffer
//!
//! Fixed-capacity, most-recent-first history used for alerts, detections and
//! camera reports. Ordering is strictly by arrival: the newest `push` is always
//! at index 0, whatever timestamp the item carries. When the buffer is full the
//! oldest entries fall off the tail.
//!
//! The buffer never looks items up by id. Callers that need to update a record
//! map over [`BoundedEventBuffer::iter`] and hand the result to
//! [`BoundedEventBuffer::replace`].

use std::collections::VecDeque;

/// A capped, insertion-ordered history.
#[derive(Debug, Clone)]
pub struct BoundedEventBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> BoundedEventBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepends `item`, dropping tail entries until `len() <= capacity()`.
    pub fn push(&mut self, item: T) {
        self.items.push_front(item);
        self.items.truncate(self.capacity);
    }

    /// An independent copy of the contents, newest first.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// Replaces the whole contents with `items` (given newest first), keeping
    /// at most `capacity()` of them.
    pub fn replace<I>(&mut self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        self.items = items.into_iter().take(self.capacity).collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
