//! A bounded worker-thread pool, sized by available parallelism, exposed as
//! a capability callers may use for fan-out across bulletin-board labels
//! (§4.8). The bulletin board and shutdown state machines remain
//! single-threaded per logical operation; this is a caller-side
//! convenience, never something those components depend on internally.
//!
//! Per the REDESIGN FLAGS ("executor with per-core threads"), this models
//! the original per-core thread pool as an explicit, bounded task pool a
//! caller constructs and threads through, rather than a process-wide
//! implicit executor.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads draining a shared job queue.
pub struct Executor {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor").field("workers", &self.workers.len()).finish()
    }
}

impl Executor {
    /// Creates a pool of exactly `worker_count` threads.
    pub fn new(worker_count: NonZeroUsize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..worker_count.get())
            .map(|index| {
                let receiver = Arc::clone(&receiver);
                thread::Builder::new()
                    .name(format!("vcr-executor-{index}"))
                    .spawn(move || loop {
                        let job = {
                            let receiver = receiver.lock().expect("executor receiver mutex poisoned");
                            receiver.recv()
                        };
                        match job {
                            Ok(job) => job(),
                            Err(_) => break,
                        }
                    })
                    .expect("failed to spawn executor worker thread")
            })
            .collect();

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Creates a pool sized to `std::thread::available_parallelism`,
    /// falling back to a single worker if that cannot be determined.
    pub fn with_available_parallelism() -> Self {
        let count = thread::available_parallelism().unwrap_or(NonZeroUsize::new(1).expect("1 is nonzero"));
        Self::new(count)
    }

    /// Queues `job` to run on the next free worker. Panics if every worker
    /// has already terminated (only possible after `Executor` itself has
    /// started dropping).
    pub fn spawn(&self, job: impl FnOnce() + Send + 'static) {
        self.sender
            .as_ref()
            .expect("executor sender missing before drop")
            .send(Box::new(job))
            .expect("executor workers terminated unexpectedly");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Dropping the sender closes the channel, so each worker's `recv`
        // returns `Err` and the loop exits.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn runs_every_queued_job() {
        let executor = Executor::new(NonZeroUsize::new(4).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(11));

        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            executor.spawn(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                barrier.wait();
            });
        }
        barrier.wait();

        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn available_parallelism_constructor_has_at_least_one_worker() {
        let executor = Executor::with_available_parallelism();
        assert!(executor.worker_count() >= 1);
    }
}
