use std::{sync::Arc, time::Duration};

use thiserror::Error;

use crate::lookup::LookupError;

/// Result type returned by fallible operations of this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by targeting evaluation and advertisement selection.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("failed to fetch content for marketplace {marketplace_id:?}")]
    ContentLookup {
        /// Marketplace whose content was requested.
        marketplace_id: String,
        /// Failure reported by the lookup.
        #[source]
        source: LookupError,
    },
    #[error("failed to fetch targeting groups for content {content_id:?}")]
    TargetingGroupLookup {
        /// Content whose targeting groups were requested.
        content_id: String,
        /// Failure reported by the lookup.
        #[source]
        source: LookupError,
    },
    /// Some predicates did not report a result in time. This is not the same as a predicate
    /// evaluating to false: eligibility could not be determined.
    #[error("targeting evaluation timed out after {timeout:?} with {pending} predicate(s) pending")]
    EvaluationTimeout {
        /// Configured bound on the evaluation.
        timeout: Duration,
        /// Number of predicates that had not reported when the bound elapsed.
        pending: usize,
    },
    /// The caller cancelled the selection before it completed.
    #[error("targeting evaluation was cancelled")]
    Cancelled,
    /// A predicate panicked, so the group's verdict is unknown.
    #[error("targeting predicate panicked")]
    PredicatePanicked,
    /// Work was submitted after [`WorkerPool::stop`](crate::WorkerPool::stop).
    #[error("worker pool is stopped")]
    WorkerPoolStopped,
    /// A worker thread panicked outside of a job, or a pool lock is poisoned.
    #[error("worker thread panicked")]
    WorkerPoolPanicked,
    /// A targeting group was created with a negative or non-finite click-through rate.
    #[error("invalid click-through rate {0}, must be finite and non-negative")]
    InvalidClickThroughRate(f64),
    /// Spawning a worker thread failed.
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    #[error(transparent)]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}
