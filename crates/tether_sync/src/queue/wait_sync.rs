use std::collections::VecDeque;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tether_logging::{log_debug, log_verbose};
use super::{assert_swap_target_empty, ConcurrentQueue, QueueStopped, LOG_CAT};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum QueueEnd {
    Front,
    Back,
}

#[derive(Debug)]
struct QueueState<T> {
    items          : VecDeque<T>,
    // `None` means there is no limit
    max_queue_size : Option<usize>,
    stop_requested : bool,
}

impl<T> QueueState<T> {
    fn is_full(&self) -> bool {
        self.max_queue_size.map_or(false, |max| self.items.len() >= max)
    }
}

/// Thread-safe queue which allows waiting for values to appear or to be consumed.
///
/// When the queue is empty, popping blocks until a value is pushed.
/// When the queue has reached its maximum size, pushing blocks until a value is popped.
///
/// [`stop_all_waiters`] permanently stops the queue:
/// every blocked push or pop returns a failure, and so does any push or pop called afterwards.
/// The content of a stopped queue can still be retrieved with [`swap_with_empty`].
///
/// No guarantee is made about which waiting thread gets to continue first, when a value or free slot becomes available.
///
/// [`stop_all_waiters`]: WaitSyncQueue::stop_all_waiters
/// [`swap_with_empty`]: WaitSyncQueue::swap_with_empty
#[derive(Debug)]
pub struct WaitSyncQueue<T> {
    state     : Mutex<QueueState<T>>,
    not_full  : Condvar,
    not_empty : Condvar,
}

impl<T> WaitSyncQueue<T> {
    /// Create an empty queue without a maximum size
    pub const fn new() -> Self {
        Self::with_max_queue_size(None)
    }

    /// Create an empty queue with the given maximum size, `None` meaning there is no limit
    pub const fn with_max_queue_size(max_queue_size: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                max_queue_size,
                stop_requested: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Set the maximum number of values the queue can hold, `None` meaning there is no limit.
    ///
    /// Lowering the maximum below the current length does not remove any values, further pushes will block until enough values are popped.
    pub fn set_max_queue_size(&self, max_queue_size: Option<usize>) {
        let mut state = self.state.lock();
        state.max_queue_size = max_queue_size;
        if !state.is_full() {
            self.not_full.notify_all();
        }
    }

    /// Get the maximum number of values the queue can hold, `None` meaning there is no limit
    pub fn max_queue_size(&self) -> Option<usize> {
        self.state.lock().max_queue_size
    }

    /// Check if `stop_all_waiters` was called on this queue
    pub fn is_stopped(&self) -> bool {
        self.state.lock().stop_requested
    }

    /// Append a value to the back of the queue.
    ///
    /// If the queue is full, the current thread is blocked until a value is consumed.
    /// If the queue is, or gets stopped while waiting, the value is returned in the `Err`.
    pub fn push_back(&self, value: T) -> Result<(), QueueStopped<T>> {
        self.push_internal(value, QueueEnd::Back)
    }

    /// Insert a value at the front of the queue.
    ///
    /// If the queue is full, the current thread is blocked until a value is consumed.
    /// If the queue is, or gets stopped while waiting, the value is returned in the `Err`.
    pub fn push_front(&self, value: T) -> Result<(), QueueStopped<T>> {
        self.push_internal(value, QueueEnd::Front)
    }

    /// Remove the value at the back of the queue.
    ///
    /// If the queue is empty, the current thread is blocked until a value is pushed.
    /// Returns `None` if the queue is, or gets stopped while waiting.
    pub fn pop_back(&self) -> Option<T> {
        self.pop_internal(QueueEnd::Back)
    }

    /// Remove the value at the front of the queue.
    ///
    /// If the queue is empty, the current thread is blocked until a value is pushed.
    /// Returns `None` if the queue is, or gets stopped while waiting.
    pub fn pop_front(&self) -> Option<T> {
        self.pop_internal(QueueEnd::Front)
    }

    /// Swap the content of the queue with `other`, which needs to be empty.
    ///
    /// This is an efficient way of retrieving the whole content of the queue, and also works on a stopped queue.
    ///
    /// # Panics
    ///
    /// Panics if `other` is not empty.
    #[track_caller]
    pub fn swap_with_empty(&self, other: &mut VecDeque<T>) {
        assert_swap_target_empty(other);
        let mut state = self.state.lock();
        core::mem::swap(&mut state.items, other);
        if !state.is_full() {
            self.not_full.notify_all();
        }
    }

    /// Stop the queue, waking up all blocked threads.
    ///
    /// All blocked pushes and pops will fail, as will all pushes and pops started afterwards.
    /// Stopping a queue is permanent, calling this on a stopped queue does nothing.
    pub fn stop_all_waiters(&self) {
        let mut state = self.state.lock();
        if state.stop_requested {
            return;
        }
        state.stop_requested = true;

        let woken = self.not_full.notify_all() + self.not_empty.notify_all();
        log_verbose!(LOG_CAT, "Queue stopped with {} values left, woke up {} waiters", state.items.len(), woken);
    }

    fn push_internal(&self, value: T, end: QueueEnd) -> Result<(), QueueStopped<T>> {
        let mut state = self.state.lock();
        if let Err(()) = Self::wait_while(&mut state, &self.not_full, QueueState::is_full) {
            log_debug!(LOG_CAT, Self::push_internal, "Push to the {:?} of a stopped queue was rejected", end);
            return Err(QueueStopped(value));
        }

        let was_empty = state.items.is_empty();
        match end {
            QueueEnd::Front => state.items.push_front(value),
            QueueEnd::Back => state.items.push_back(value),
        }

        if was_empty {
            self.not_empty.notify_all();
        }
        Ok(())
    }

    fn pop_internal(&self, end: QueueEnd) -> Option<T> {
        let mut state = self.state.lock();
        if let Err(()) = Self::wait_while(&mut state, &self.not_empty, |state| state.items.is_empty()) {
            log_debug!(LOG_CAT, Self::pop_internal, "Pop from the {:?} of a stopped queue was rejected", end);
            return None;
        }

        let value = match end {
            QueueEnd::Front => state.items.pop_front(),
            QueueEnd::Back => state.items.pop_back(),
        };

        if !state.is_full() {
            self.not_full.notify_one();
        }
        value
    }

    /// Wait on `condvar` until `blocked` returns `false`.
    ///
    /// The stop flag is checked before the predicate each time the thread wakes up, returns `Err` if the queue was stopped.
    fn wait_while<F>(state: &mut MutexGuard<'_, QueueState<T>>, condvar: &Condvar, mut blocked: F) -> Result<(), ()>
    where
        F: FnMut(&QueueState<T>) -> bool
    {
        loop {
            if state.stop_requested {
                return Err(());
            }
            if !blocked(&**state) {
                return Ok(());
            }
            condvar.wait(state);
        }
    }
}

impl<T> Default for WaitSyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentQueue<T> for WaitSyncQueue<T> {
    fn push_back(&self, value: T) -> Result<(), QueueStopped<T>> {
        WaitSyncQueue::push_back(self, value)
    }

    fn push_front(&self, value: T) -> Result<(), QueueStopped<T>> {
        WaitSyncQueue::push_front(self, value)
    }

    fn pop_back(&self) -> Option<T> {
        WaitSyncQueue::pop_back(self)
    }

    fn pop_front(&self) -> Option<T> {
        WaitSyncQueue::pop_front(self)
    }

    fn swap_with_empty(&self, other: &mut VecDeque<T>) {
        WaitSyncQueue::swap_with_empty(self, other)
    }

    fn is_empty(&self) -> bool {
        WaitSyncQueue::is_empty(self)
    }

    fn len(&self) -> usize {
        WaitSyncQueue::len(self)
    }
}

static_assertions::assert_impl_all!(WaitSyncQueue<u32>: Send, Sync, Default);
