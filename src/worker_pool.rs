//! A fixed-size pool of worker threads used to evaluate targeting predicates.
use std::{
    panic::AssertUnwindSafe,
    sync::{
        mpsc::{self, Receiver, Sender},
        Arc, Mutex,
    },
    thread::JoinHandle,
};

use crate::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Configuration for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads.
    ///
    /// Defaults to the available parallelism of the machine, or
    /// [`WorkerPoolConfig::FALLBACK_THREADS`] if it cannot be determined.
    pub threads: usize,
}

impl WorkerPoolConfig {
    /// Number of threads used when available parallelism cannot be determined.
    pub const FALLBACK_THREADS: usize = 4;

    /// Create a new `WorkerPoolConfig` using default configuration.
    pub fn new() -> WorkerPoolConfig {
        WorkerPoolConfig::default()
    }

    /// Update number of worker threads with `threads`. Zero is bumped to one.
    pub fn with_threads(mut self, threads: usize) -> WorkerPoolConfig {
        self.threads = threads.max(1);
        self
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> WorkerPoolConfig {
        WorkerPoolConfig {
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(WorkerPoolConfig::FALLBACK_THREADS),
        }
    }
}

/// A bounded, shareable pool of worker threads.
///
/// The pool is meant to be started once (usually at application startup), shared via `Arc`
/// between all evaluators, and shut down explicitly at teardown.
pub struct WorkerPool {
    /// Holds `None` once the pool has been stopped. Dropping the sender closes the queue, which
    /// makes workers exit after draining already queued jobs.
    job_sender: Mutex<Option<Sender<Job>>>,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl WorkerPool {
    /// Start worker threads.
    pub fn start(config: WorkerPoolConfig) -> Result<WorkerPool> {
        let threads = config.threads.max(1);
        let (job_sender, job_receiver) = mpsc::channel::<Job>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));

        let mut join_handles = Vec::with_capacity(threads);
        for n in 0..threads {
            let job_receiver = Arc::clone(&job_receiver);
            let join_handle = std::thread::Builder::new()
                .name(format!("ad-selection-worker-{n}"))
                .spawn(move || worker_loop(job_receiver))?;
            join_handles.push(join_handle);
        }

        log::debug!(target: "ad_selection", threads; "started worker pool");

        Ok(WorkerPool {
            job_sender: Mutex::new(Some(job_sender)),
            join_handles: Mutex::new(join_handles),
            threads,
        })
    }

    /// Number of worker threads in the pool.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue `job` for execution on one of the worker threads.
    pub(crate) fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<()> {
        let sender = self
            .job_sender
            .lock()
            .map_err(|_| Error::WorkerPoolPanicked)?;
        let Some(sender) = sender.as_ref() else {
            return Err(Error::WorkerPoolStopped);
        };
        // Error means that all workers have exited.
        sender
            .send(Box::new(job))
            .map_err(|_| Error::WorkerPoolStopped)
    }

    /// Stop accepting new jobs.
    ///
    /// This function does not wait for the workers to exit. Jobs already queued are still run.
    pub fn stop(&self) {
        if let Ok(mut sender) = self.job_sender.lock() {
            if sender.take().is_some() {
                log::debug!(target: "ad_selection", "worker pool received stop command");
            }
        }
    }

    /// Stop the pool and block waiting for all workers to exit.
    ///
    /// Must not be called from a job running on this pool.
    pub fn shutdown(&self) -> Result<()> {
        self.stop();

        let join_handles = {
            let mut join_handles = self
                .join_handles
                .lock()
                .map_err(|_| Error::WorkerPoolPanicked)?;
            std::mem::take(&mut *join_handles)
        };

        let mut result = Ok(());
        for join_handle in join_handles {
            if join_handle.join().is_err() {
                result = Err(Error::WorkerPoolPanicked);
            }
        }
        result
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(job_receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        // The lock is released at the end of the statement, before the job runs.
        let job = match job_receiver.lock() {
            Ok(receiver) => receiver.recv(),
            Err(_) => return,
        };

        let Ok(job) = job else {
            // The queue is closed and drained.
            return;
        };

        if std::panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            let current = std::thread::current();
            log::error!(target: "ad_selection",
                        thread = current.name().unwrap_or("unnamed");
                        "job panicked on worker thread");
        }
    }
}
