//! Mutexes which enforce a lock hierarchy.
//!
//! Each hierarchical mutex is given a level when it is created.
//! A thread holding a hierarchical mutex may only lock other hierarchical mutexes with a strictly lower level.
//! Locking a mutex from a higher (or the same) level after one from a lower level is a programming error which could deadlock when another thread locks the same mutexes in the opposite order,
//! so it is treated as fatal at the first violating lock, instead of waiting for the deadlock to actually happen.
//!
//! The first lock on a thread always succeeds.
//!
//! # Example
//!
//! ```
//! use tether_sync::hierarchical_mutex;
//!
//! let resource = hierarchical_mutex(1000, Vec::<u32>::new());
//! let shard = hierarchical_mutex(100, 0u32);
//!
//! let mut res_guard = resource.lock();
//! // Locking a lower level after a higher level is allowed
//! let mut shard_guard = shard.lock();
//! *shard_guard += 1;
//! res_guard.push(*shard_guard);
//! ```
//!
//! Locking `resource` while only `shard` is held will halt the program.
//!
//! # Release order
//!
//! Locks need to be released in the reverse order they were acquired in, which scoped guards do automatically.
//! Releasing out of order corrupts the hierarchy of the thread, debug builds will catch this on release.

use core::{
    cell::{Cell, UnsafeCell},
    fmt,
};
use parking_lot::lock_api::{self, GuardNoSend};
use tether_logging::{log_severe, LogCategory};

const LOG_CAT : LogCategory = LogCategory::new_with_sub("Sync", "Hierarchy");

/// Level of a hierarchical mutex, higher levels need to be locked first
pub type HierarchyLevel = u32;

thread_local! {
    // Level of the innermost hierarchical mutex held by this thread, `None` if no mutex is held
    static THREAD_HIERARCHY_LEVEL : Cell<Option<HierarchyLevel>> = const { Cell::new(None) };
}

/// Get the level of the innermost hierarchical mutex held by the current thread.
///
/// Returns `None` if the current thread doesn't hold any hierarchical mutex.
pub fn current_hierarchy_level() -> Option<HierarchyLevel> {
    THREAD_HIERARCHY_LEVEL.with(Cell::get)
}

fn set_current_hierarchy_level(level: Option<HierarchyLevel>) {
    THREAD_HIERARCHY_LEVEL.with(|cur| cur.set(level));
}

cfg_if::cfg_if! {
    if #[cfg(feature = "abort_on_violation")] {
        fn terminate(_message: &str) -> ! {
            std::process::abort()
        }
    } else {
        fn terminate(message: &str) -> ! {
            panic!("{message}")
        }
    }
}

#[cold]
#[inline(never)]
fn hierarchy_violation(level: HierarchyLevel, held: HierarchyLevel) -> ! {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    log_severe!(LOG_CAT, hierarchy_violation, "Thread '{}' tried to lock level {} while holding level {}", thread_name, level, held);
    terminate(&format!("lock hierarchy violation: level {level} locked while holding level {held}"))
}

/// Raw hierarchical mutex, wrapping another raw mutex.
///
/// The wrapped mutex does the actual locking, this type only keeps track of the hierarchy of the current thread.
pub struct RawHierarchicalMutex<R = parking_lot::RawMutex> {
    inner       : R,
    level       : HierarchyLevel,
    // Only accessed while `inner` is held
    saved_level : UnsafeCell<Option<HierarchyLevel>>,
}

// SAFETY: `saved_level` is only accessed by the thread holding `inner`
unsafe impl<R: lock_api::RawMutex + Sync> Sync for RawHierarchicalMutex<R> {}

impl<R: lock_api::RawMutex> RawHierarchicalMutex<R> {
    /// Create a new unlocked raw mutex at the given level
    pub const fn new(level: HierarchyLevel) -> Self {
        Self {
            inner: R::INIT,
            level,
            saved_level: UnsafeCell::new(None),
        }
    }

    /// Get the hierarchy level of the mutex
    pub const fn level(&self) -> HierarchyLevel {
        self.level
    }

    /// Returns the level held by the current thread before locking this mutex
    #[inline]
    fn check_hierarchy(&self) -> Option<HierarchyLevel> {
        let held = current_hierarchy_level();
        if let Some(held) = held {
            if self.level >= held {
                hierarchy_violation(self.level, held);
            }
        }
        held
    }

    /// # Safety
    ///
    /// `inner` must have just been acquired by the current thread
    #[inline]
    unsafe fn on_acquired(&self, previous: Option<HierarchyLevel>) {
        *self.saved_level.get() = previous;
        set_current_hierarchy_level(Some(self.level));
    }
}

unsafe impl<R: lock_api::RawMutex> lock_api::RawMutex for RawHierarchicalMutex<R> {
    /// Mutex at the outermost level, which can't be locked while any other hierarchical mutex is held
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new(HierarchyLevel::MAX);

    // The hierarchy is tracked per thread, so the mutex needs to be unlocked on the thread that locked it
    type GuardMarker = GuardNoSend;

    #[inline]
    fn lock(&self) {
        let previous = self.check_hierarchy();
        self.inner.lock();
        // SAFETY: the lock was acquired above
        unsafe { self.on_acquired(previous) };
    }

    #[inline]
    fn try_lock(&self) -> bool {
        let previous = self.check_hierarchy();
        let acquired = self.inner.try_lock();
        if acquired {
            // SAFETY: the lock was acquired above
            unsafe { self.on_acquired(previous) };
        }
        acquired
    }

    /// When releasing out of order fails the debug check, `inner` is left locked.
    #[inline]
    unsafe fn unlock(&self) {
        debug_assert_eq!(current_hierarchy_level(), Some(self.level), "hierarchical mutex released out of order, or by a thread not holding it");
        set_current_hierarchy_level(*self.saved_level.get());
        self.inner.unlock();
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

unsafe impl<R: lock_api::RawMutexFair> lock_api::RawMutexFair for RawHierarchicalMutex<R> {
    /// When releasing out of order fails the debug check, `inner` is left locked.
    #[inline]
    unsafe fn unlock_fair(&self) {
        debug_assert_eq!(current_hierarchy_level(), Some(self.level), "hierarchical mutex released out of order, or by a thread not holding it");
        set_current_hierarchy_level(*self.saved_level.get());
        self.inner.unlock_fair();
    }
}

impl<R> fmt::Debug for RawHierarchicalMutex<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawHierarchicalMutex")
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

/// A mutual exclusion primitive which enforces a per-thread lock hierarchy: while holding it, only mutexes with a lower level can be locked.
///
/// Apart from the hierarchy check, this mutex behaves like `parking_lot`'s `Mutex`.
///
/// Use [`hierarchical_mutex`] to create one at a given level.
/// `HierarchicalMutex::new` and `Default` create a mutex at level `HierarchyLevel::MAX`,
/// which can only be locked while the thread holds no other hierarchical mutex.
pub type HierarchicalMutex<T> = lock_api::Mutex<RawHierarchicalMutex, T>;

/// An RAII implementation of a "scoped lock" of a hierarchical mutex.
/// When this structure is dropped (falls out of scope), the lock will be unlocked and the previous level of the thread is restored.
///
/// The guard can't be sent to another thread, as the hierarchy is tracked per thread.
pub type HierarchicalMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawHierarchicalMutex, T>;

/// An RAII mutex guard returned by `HierarchicalMutexGuard::map`, which can point to a subfield of the protected data.
pub type MappedHierarchicalMutexGuard<'a, T> = lock_api::MappedMutexGuard<'a, RawHierarchicalMutex, T>;

/// A hierarchical mutex which is always fair, backed by `parking_lot`'s fair mutex
pub type FairHierarchicalMutex<T> = lock_api::Mutex<RawHierarchicalMutex<parking_lot::RawFairMutex>, T>;

/// An RAII implementation of a "scoped lock" of a fair hierarchical mutex.
pub type FairHierarchicalMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawHierarchicalMutex<parking_lot::RawFairMutex>, T>;

/// Create a hierarchical mutex at the given level
pub const fn hierarchical_mutex<T>(level: HierarchyLevel, val: T) -> HierarchicalMutex<T> {
    HierarchicalMutex::const_new(RawHierarchicalMutex::new(level), val)
}

/// Create a fair hierarchical mutex at the given level
pub const fn fair_hierarchical_mutex<T>(level: HierarchyLevel, val: T) -> FairHierarchicalMutex<T> {
    FairHierarchicalMutex::const_new(RawHierarchicalMutex::new(level), val)
}

static_assertions::assert_impl_all!(HierarchicalMutex<u32>: Send, Sync);
static_assertions::assert_not_impl_any!(HierarchicalMutexGuard<'static, u32>: Send);

#[cfg(test)]
mod tests;
