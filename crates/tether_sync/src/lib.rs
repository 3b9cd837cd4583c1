//! Synchronization primitives built on top of `parking_lot`.
//!
//! - [`HierarchicalMutex`]: a mutex which turns lock ordering bugs into an immediate failure, by enforcing a per-thread lock hierarchy.
//! - [`SynchronizedQueue`]: a lock-protected double-ended queue.
//! - [`WaitSyncQueue`]: a double-ended queue which blocks consumers when empty, producers when full, and can stop all its waiters.
//!
//! ## Crate features
//!
//! - `abort_on_violation`: abort the process on a lock hierarchy violation, instead of panicking.
//!
//! ## Failures
//!
//! Using any of these primitives incorrectly, like violating the lock hierarchy or swapping a queue with a non-empty container, is a programming error and panics.
//! The only failure a caller is expected to handle is a stopped [`WaitSyncQueue`].

mod hierarchy;
pub mod queue;

pub use hierarchy::*;
pub use queue::{ConcurrentQueue, QueueStopped, SynchronizedQueue, WaitSyncQueue};
