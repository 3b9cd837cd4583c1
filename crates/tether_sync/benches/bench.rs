use criterion::{criterion_main, criterion_group, Criterion};

use std::{hint::black_box, thread};
use tether_sync::{hierarchical_mutex, SynchronizedQueue, WaitSyncQueue};

const NUM_VALUES: u32 = 10_000;

fn mutex_benchmark(c: &mut Criterion) {
    let outer = hierarchical_mutex(1000, 0u64);
    let inner = hierarchical_mutex(100, 0u64);
    let plain = parking_lot::Mutex::new(0u64);

    c.bench_function("parking_lot mutex: lock", |b| b.iter(|| {
        *plain.lock() += 1;
    }));

    c.bench_function("hierarchical mutex: lock", |b| b.iter(|| {
        *inner.lock() += 1;
    }));

    c.bench_function("hierarchical mutex: nested lock", |b| b.iter(|| {
        let mut outer = outer.lock();
        let mut inner = inner.lock();
        *outer += 1;
        *inner += 1;
    }));
}

fn queue_benchmark(c: &mut Criterion) {
    c.bench_function("synchronized queue: push/pop 10000", |b| b.iter(|| {
        let queue = SynchronizedQueue::new();
        for i in 0..NUM_VALUES {
            queue.push_back(i);
        }
        while let Some(val) = queue.pop_front() {
            black_box(val);
        }
    }));

    c.bench_function("wait queue: push/pop 10000", |b| b.iter(|| {
        let queue = WaitSyncQueue::new();
        for i in 0..NUM_VALUES {
            _ = queue.push_back(i);
        }
        for _ in 0..NUM_VALUES {
            black_box(queue.pop_front());
        }
    }));

    c.bench_function("wait queue: bounded producer/consumer 10000", |b| b.iter(|| {
        let queue = WaitSyncQueue::with_max_queue_size(Some(64));
        thread::scope(|s| {
            s.spawn(|| {
                for i in 0..NUM_VALUES {
                    _ = queue.push_back(i);
                }
            });
            for _ in 0..NUM_VALUES {
                black_box(queue.pop_front());
            }
        });
    }));
}

criterion_group!(benches, mutex_benchmark, queue_benchmark);
criterion_main!(benches);
