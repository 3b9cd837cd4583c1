//! Thread-safe double-ended queues.
//!
//! Queue semantics are provided by `push_back`/`pop_front`, stack semantics by `push_back`/`pop_back`.
//! All operations are atomic with regards to each other.
//!
//! - [`SynchronizedQueue`] only synchronizes the operations, it never blocks on the content of the queue.
//! - [`WaitSyncQueue`] blocks consumers while it's empty and producers while it's full, and can stop all its waiters.
//!
//! Both implement [`ConcurrentQueue`], so code can switch between them without other changes.
//!
//! Distinct queues don't have any lock ordering between them,
//! so producer/consumer chains which form a cycle over multiple bounded queues can deadlock.

use core::fmt;
use std::collections::VecDeque;
use tether_logging::LogCategory;

mod synchronized;
mod wait_sync;

pub use synchronized::SynchronizedQueue;
pub use wait_sync::WaitSyncQueue;

const LOG_CAT : LogCategory = LogCategory::new_with_sub("Sync", "Queue");

/// Error returned when a value could not be pushed, because the queue was stopped.
///
/// The value that failed to be pushed is returned.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct QueueStopped<T>(pub T);

impl<T> QueueStopped<T> {
    /// Get the value that could not be pushed
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueStopped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueStopped(..)")
    }
}

impl<T> fmt::Display for QueueStopped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("pushing to a stopped queue")
    }
}

impl<T> std::error::Error for QueueStopped<T> {}

/// Common interface of the thread-safe queues
pub trait ConcurrentQueue<T> {
    /// Append a value to the back of the queue
    fn push_back(&self, value: T) -> Result<(), QueueStopped<T>>;

    /// Insert a value at the front of the queue
    fn push_front(&self, value: T) -> Result<(), QueueStopped<T>>;

    /// Remove the value at the back of the queue
    fn pop_back(&self) -> Option<T>;

    /// Remove the value at the front of the queue
    fn pop_front(&self) -> Option<T>;

    /// Swap the content of the queue with `other`, which needs to be empty.
    ///
    /// This is an efficient way of retrieving the whole content of the queue.
    ///
    /// # Panics
    ///
    /// Panics if `other` is not empty.
    fn swap_with_empty(&self, other: &mut VecDeque<T>);

    /// Check if the queue is empty
    fn is_empty(&self) -> bool;

    /// Get the number of values in the queue
    fn len(&self) -> usize;
}

#[track_caller]
fn assert_swap_target_empty<T>(other: &VecDeque<T>) {
    assert!(other.is_empty(), "queue can only be swapped with an empty container, got {} elements", other.len());
}
