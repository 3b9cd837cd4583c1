use std::collections::VecDeque;
use parking_lot::Mutex;
use super::{assert_swap_target_empty, ConcurrentQueue, QueueStopped};

/// Queue which synchronizes all its operations using only locking.
///
/// Pushing never fails and popping from an empty queue returns `None` immediately.
#[derive(Debug)]
pub struct SynchronizedQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> SynchronizedQueue<T> {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self { items: Mutex::new(VecDeque::new()) }
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn push_back(&self, value: T) {
        self.items.lock().push_back(value);
    }

    pub fn push_front(&self, value: T) {
        self.items.lock().push_front(value);
    }

    /// Remove the value at the back of the queue, or `None` if the queue is empty
    pub fn pop_back(&self) -> Option<T> {
        self.items.lock().pop_back()
    }

    /// Remove the value at the front of the queue, or `None` if the queue is empty
    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Swap the content of the queue with `other`, which needs to be empty.
    ///
    /// # Panics
    ///
    /// Panics if `other` is not empty.
    #[track_caller]
    pub fn swap_with_empty(&self, other: &mut VecDeque<T>) {
        assert_swap_target_empty(other);
        core::mem::swap(&mut *self.items.lock(), other);
    }
}

impl<T> Default for SynchronizedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentQueue<T> for SynchronizedQueue<T> {
    fn push_back(&self, value: T) -> Result<(), QueueStopped<T>> {
        SynchronizedQueue::push_back(self, value);
        Ok(())
    }

    fn push_front(&self, value: T) -> Result<(), QueueStopped<T>> {
        SynchronizedQueue::push_front(self, value);
        Ok(())
    }

    fn pop_back(&self) -> Option<T> {
        SynchronizedQueue::pop_back(self)
    }

    fn pop_front(&self) -> Option<T> {
        SynchronizedQueue::pop_front(self)
    }

    fn swap_with_empty(&self, other: &mut VecDeque<T>) {
        SynchronizedQueue::swap_with_empty(self, other)
    }

    fn is_empty(&self) -> bool {
        SynchronizedQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        SynchronizedQueue::len(self)
    }
}
