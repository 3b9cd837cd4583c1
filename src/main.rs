use std::{collections::VecDeque, thread};

use tether_logging::{get_logger, log_info, log_warning, set_logger, LogCategory, LogLevel, Logger};
use tether_sync::{hierarchical_mutex, HierarchicalMutex, HierarchyLevel, SynchronizedQueue, WaitSyncQueue};

pub const LOG_CAT : LogCategory = LogCategory::new("Main");

const NUM_PRODUCERS : u64 = 4;
const NUM_WORKERS : usize = 3;
const VALUES_PER_PRODUCER : u64 = 10_000;
const MAX_QUEUE_SIZE : usize = 128;

// Levels of the pipeline locks, the totals are always locked before a single worker's stats
const TOTALS_LEVEL : HierarchyLevel = 1000;
const WORKER_LEVEL : HierarchyLevel = 100;

static LOGGER : Logger = Logger::new();

#[derive(Default, Debug)]
struct Totals {
    count : u64,
    sum   : u64,
}

struct Pipeline {
    input   : WaitSyncQueue<u64>,
    output  : SynchronizedQueue<u64>,
    totals  : HierarchicalMutex<Totals>,
    workers : Vec<HierarchicalMutex<u64>>,
    // Values drained from the input by the main thread at shutdown
    drained : HierarchicalMutex<u64>,
}

impl Pipeline {
    fn new() -> Self {
        Self {
            input: WaitSyncQueue::with_max_queue_size(Some(MAX_QUEUE_SIZE)),
            output: SynchronizedQueue::new(),
            totals: hierarchical_mutex(TOTALS_LEVEL, Totals::default()),
            workers: (0..NUM_WORKERS).map(|_| hierarchical_mutex(WORKER_LEVEL, 0)).collect(),
            drained: hierarchical_mutex(WORKER_LEVEL, 0),
        }
    }

    fn produce(&self, producer: u64) {
        for i in 0..VALUES_PER_PRODUCER {
            if let Err(err) = self.input.push_back(producer * VALUES_PER_PRODUCER + i) {
                log_warning!(LOG_CAT, "Producer {} stopped early: {}", producer, err);
                return;
            }
        }
    }

    fn work(&self, worker: usize) {
        // `None` means the input was stopped and drained
        while let Some(value) = self.input.pop_front() {
            self.process(&self.workers[worker], value);
        }
    }

    fn process(&self, stats: &HierarchicalMutex<u64>, value: u64) {
        {
            let mut totals = self.totals.lock();
            let mut processed = stats.lock();
            totals.count += 1;
            totals.sum += value;
            *processed += 1;
        }
        self.output.push_back(value * 2);
    }

    fn run(&self) {
        thread::scope(|s| {
            let workers: Vec<_> = (0..NUM_WORKERS)
                .map(|worker| s.spawn(move || self.work(worker)))
                .collect();

            thread::scope(|s| {
                for producer in 0..NUM_PRODUCERS {
                    s.spawn(move || self.produce(producer));
                }
            });

            // Take over whatever the workers haven't picked up yet, then release them
            let mut rest = VecDeque::new();
            self.input.swap_with_empty(&mut rest);
            self.input.stop_all_waiters();
            for value in rest {
                self.process(&self.drained, value);
            }

            for worker in workers {
                if worker.join().is_err() {
                    log_warning!(LOG_CAT, "A worker panicked");
                }
            }
        });
    }
}

fn main() {
    if set_logger(&LOGGER).is_err() {
        panic!("Failed to set the logger");
    }
    get_logger().set_max_level(LogLevel::Verbose);

    let pipeline = Pipeline::new();
    pipeline.run();

    let totals = pipeline.totals.lock();
    log_info!(LOG_CAT, "Processed {} values, sum {}, {} outputs", totals.count, totals.sum, pipeline.output.len());
    for (idx, worker) in pipeline.workers.iter().enumerate() {
        // The totals are still held, so a worker's stats can be locked
        log_info!(LOG_CAT, "Worker {} processed {} values", idx, *worker.lock());
    }
    log_info!(LOG_CAT, "{} values were drained at shutdown", *pipeline.drained.lock());
    drop(totals);

    get_logger().flush();
}
