use super::*;
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};
use parking_lot::lock_api::{RawMutex as _, RawMutexFair as _};

#[derive(Clone, Copy, Debug)]
enum LockInstruction {
    Lock(HierarchyLevel),
    Unlock(HierarchyLevel),
}

use LockInstruction::{Lock, Unlock};

// Runs the instructions on raw mutexes, creating a mutex when its level is locked and destroying it when it is unlocked
fn run_instructions(instructions: &[LockInstruction]) {
    let mut mutexes = BTreeMap::<HierarchyLevel, Box<RawHierarchicalMutex>>::new();
    for instruction in instructions {
        match *instruction {
            Lock(level) => {
                assert!(!mutexes.contains_key(&level));
                let mutex = Box::new(RawHierarchicalMutex::<parking_lot::RawMutex>::new(level));
                mutex.lock();
                assert!(mutex.is_locked());
                assert_eq!(current_hierarchy_level(), Some(level));
                mutexes.insert(level, mutex);
            },
            Unlock(level) => {
                let mutex = mutexes.remove(&level).expect("unlocking a level which was never locked");
                // SAFETY: the mutex was locked by this thread
                unsafe { mutex.unlock() };
                assert!(!mutex.is_locked());
            },
        }
    }

    // Release whatever is still held, innermost first
    while let Some((_, mutex)) = mutexes.pop_first() {
        // SAFETY: the mutex was locked by this thread
        unsafe { mutex.unlock() };
    }
    assert_eq!(current_hierarchy_level(), None);
}

fn run_instructions_on_threads(instructions: Vec<Vec<LockInstruction>>, iterations: usize) {
    let handles: Vec<_> = instructions.into_iter()
        .map(|instructions| thread::spawn(move || {
            for _ in 0..iterations {
                run_instructions(&instructions);
            }
        }))
        .collect();

    for handle in handles {
        handle.join().expect("lock thread panicked");
    }
}

#[test]
fn hierarchical_mutex_decreasing_levels() {
    run_instructions(&[Lock(5000), Lock(4000), Lock(3000), Lock(1), Lock(0)]);
}

#[test]
fn hierarchical_mutex_first_lock_always_succeeds() {
    assert_eq!(current_hierarchy_level(), None);
    let mutex = hierarchical_mutex(0, ());
    let _guard = mutex.lock();
    assert_eq!(current_hierarchy_level(), Some(0));

    // `INIT` is at the outermost level
    let outer = RawHierarchicalMutex::<parking_lot::RawMutex>::INIT;
    assert_eq!(outer.level(), HierarchyLevel::MAX);
}

#[test]
#[cfg(not(feature = "abort_on_violation"))]
#[should_panic(expected = "lock hierarchy violation")]
fn hierarchical_mutex_violates_hierarchy() {
    // 3000 is held when locking 4000
    run_instructions(&[Lock(5000), Lock(3000), Lock(4000)]);
}

#[test]
#[cfg(not(feature = "abort_on_violation"))]
#[should_panic(expected = "lock hierarchy violation")]
fn hierarchical_mutex_same_level_violates_hierarchy() {
    let first = hierarchical_mutex(10, ());
    let second = hierarchical_mutex(10, ());
    let _first = first.lock();
    let _second = second.lock();
}

#[test]
#[cfg(not(feature = "abort_on_violation"))]
#[should_panic(expected = "lock hierarchy violation")]
fn hierarchical_mutex_violation_on_other_thread() {
    let handle = thread::spawn(|| run_instructions(&[Lock(100), Lock(200)]));
    if let Err(err) = handle.join() {
        panic::resume_unwind(err);
    }
}

#[test]
fn hierarchical_mutex_restores_level_after_unlock() {
    // After 4000 is released, 4500 can be locked
    run_instructions(&[
        Lock(5000),
        Lock(4000),
        Unlock(4000),
        Lock(4500),
        Unlock(4500),
    ]);

    let outer = hierarchical_mutex(5000, ());
    let inner = hierarchical_mutex(4000, ());
    let between = hierarchical_mutex(4500, ());

    let _outer = outer.lock();
    {
        let _inner = inner.lock();
        assert_eq!(current_hierarchy_level(), Some(4000));
    }
    assert_eq!(current_hierarchy_level(), Some(5000));
    let _between = between.lock();
    assert_eq!(current_hierarchy_level(), Some(4500));
}

#[test]
fn hierarchical_mutex_hierarchy_is_per_thread() {
    // Within a single thread these would violate the hierarchy
    let t1 = vec![Lock(5000), Lock(4000), Lock(3000), Unlock(3000), Unlock(4000)];
    let t2 = vec![Lock(10000), Lock(9000), Lock(8000), Unlock(8000), Unlock(9000)];
    let t3 = vec![Lock(100), Lock(90), Lock(80), Unlock(80), Unlock(90)];

    run_instructions_on_threads(vec![t1, t2, t3], 200);
}

#[test]
fn hierarchical_mutex_interleaved_threads() {
    let a_outer = Arc::new(hierarchical_mutex(100, ()));
    let a_inner = Arc::new(hierarchical_mutex(10, ()));
    let b_outer = Arc::new(hierarchical_mutex(200, ()));
    let b_inner = Arc::new(hierarchical_mutex(50, ()));

    let thread_a = thread::spawn(move || {
        for _ in 0..1000 {
            let _outer = a_outer.lock();
            let _inner = a_inner.lock();
        }
    });
    let thread_b = thread::spawn(move || {
        for _ in 0..1000 {
            let _outer = b_outer.lock();
            let _inner = b_inner.lock();
        }
    });

    thread_a.join().expect("thread A panicked");
    thread_b.join().expect("thread B panicked");
}

#[test]
fn hierarchical_mutex_relies_on_scoped_guards() {
    let m5 = hierarchical_mutex(5, ());
    let _l5 = m5.lock();

    {
        let m3 = hierarchical_mutex(3, ());
        let _l3 = m3.lock();
    }

    let m4 = hierarchical_mutex(4, ());
    let _l4 = m4.lock();
    assert_eq!(current_hierarchy_level(), Some(4));
}

#[test]
fn hierarchical_mutex_guard_map() {
    let mutex = hierarchical_mutex(20, (1u32, 2u32));
    {
        let mut second = HierarchicalMutexGuard::map(mutex.lock(), |pair| &mut pair.1);
        *second += 40;
        assert_eq!(current_hierarchy_level(), Some(20));
    }
    assert_eq!(current_hierarchy_level(), None);
    assert_eq!(mutex.into_inner(), (1, 42));
}

#[test]
fn hierarchical_mutex_try_lock() {
    let outer = hierarchical_mutex(100, ());
    let inner = Arc::new(hierarchical_mutex(10, 0u32));

    let _outer = outer.lock();
    {
        let guard = inner.try_lock();
        assert!(guard.is_some());
        assert_eq!(current_hierarchy_level(), Some(10));

        // Contended try_lock fails without touching the hierarchy of the other thread
        let other = Arc::clone(&inner);
        thread::spawn(move || {
            assert!(other.try_lock().is_none());
            assert_eq!(current_hierarchy_level(), None);
        }).join().expect("try_lock thread panicked");
    }
    assert_eq!(current_hierarchy_level(), Some(100));
}

#[test]
#[cfg(not(feature = "abort_on_violation"))]
fn hierarchical_mutex_violation_keeps_state() {
    let inner = hierarchical_mutex(100, ());
    let outer = hierarchical_mutex(200, ());

    let _inner = inner.lock();
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        let _outer = outer.try_lock();
    }));
    assert!(res.is_err());

    // The violating mutex was never locked, and the level of the thread is unchanged
    assert!(!outer.is_locked());
    assert_eq!(current_hierarchy_level(), Some(100));
}

#[test]
fn hierarchical_mutex_contended() {
    const NUM_THREADS: usize = 4;
    const NUM_ITERATIONS: u64 = 1000;

    let counter = Arc::new(hierarchical_mutex(10, 0u64));
    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                // Each thread has its own outer mutex
                let outer = hierarchical_mutex(1000, ());
                for _ in 0..NUM_ITERATIONS {
                    let _outer = outer.lock();
                    *counter.lock() += 1;
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("counter thread panicked");
    }
    assert_eq!(*counter.lock(), NUM_THREADS as u64 * NUM_ITERATIONS);
}

#[test]
fn hierarchical_mutex_fair() {
    let outer = fair_hierarchical_mutex(2, 1u32);
    let inner = hierarchical_mutex(1, 2u32);

    let outer_guard = outer.lock();
    let inner_guard = inner.lock();
    assert_eq!(*outer_guard + *inner_guard, 3);
    drop(inner_guard);
    FairHierarchicalMutexGuard::unlock_fair(outer_guard);
    assert_eq!(current_hierarchy_level(), None);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "released out of order")]
fn hierarchical_mutex_out_of_order_release() {
    let outer = hierarchical_mutex(100, ());
    let inner = hierarchical_mutex(10, ());

    let outer_guard = outer.lock();
    let _inner_guard = inner.lock();
    // 10 is still held, so 100 is not the innermost mutex
    drop(outer_guard);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "released out of order")]
fn hierarchical_mutex_unlock_on_other_thread() {
    let mutex = Arc::new(RawHierarchicalMutex::<parking_lot::RawMutex>::new(100));
    mutex.lock();

    let other = Arc::clone(&mutex);
    let handle = thread::spawn(move || {
        // SAFETY: not upheld, the debug check fires before the raw mutex is touched
        unsafe { other.unlock() };
    });
    if let Err(err) = handle.join() {
        panic::resume_unwind(err);
    }
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "released out of order")]
fn hierarchical_mutex_fair_out_of_order_release() {
    // Raw mutexes, a guard would be released a second time while unwinding
    let outer = RawHierarchicalMutex::<parking_lot::RawFairMutex>::new(100);
    let inner = RawHierarchicalMutex::<parking_lot::RawFairMutex>::new(10);

    outer.lock();
    inner.lock();
    // SAFETY: `outer` is held by this thread, but `inner` is the innermost mutex
    unsafe { outer.unlock_fair() };
}

#[test]
fn hierarchical_mutex_new_is_outermost() {
    let outer = HierarchicalMutex::new(0u32);
    let inner = hierarchical_mutex(1000, 0u32);

    let _outer = outer.lock();
    assert_eq!(current_hierarchy_level(), Some(HierarchyLevel::MAX));
    let _inner = inner.lock();
    assert_eq!(current_hierarchy_level(), Some(1000));
}

#[test]
#[cfg(not(feature = "abort_on_violation"))]
#[should_panic(expected = "lock hierarchy violation")]
fn hierarchical_mutex_default_under_other_lock() {
    let held = hierarchical_mutex(1000, ());
    let unleveled = HierarchicalMutex::<u32>::default();

    let _held = held.lock();
    let _unleveled = unleveled.lock();
}
