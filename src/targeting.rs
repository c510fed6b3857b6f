use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    Error, RequestContext, Result, TargetingPredicate, TargetingPredicateResult, WorkerPool,
};

/// How often a blocked evaluation checks for caller cancellation.
const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A set of predicates that makes a content item eligible, together with the click-through rate
/// the content is expected to have for requests matching it.
#[derive(Clone)]
pub struct TargetingGroup {
    content_id: String,
    click_through_rate: f64,
    predicates: Vec<Arc<dyn TargetingPredicate>>,
}

impl TargetingGroup {
    /// Create a targeting group owned by `content_id`.
    ///
    /// Fails with [`Error::InvalidClickThroughRate`] if `click_through_rate` is negative or not
    /// finite.
    pub fn new(
        content_id: impl Into<String>,
        click_through_rate: f64,
        predicates: Vec<Arc<dyn TargetingPredicate>>,
    ) -> Result<TargetingGroup> {
        if !click_through_rate.is_finite() || click_through_rate < 0.0 {
            return Err(Error::InvalidClickThroughRate(click_through_rate));
        }
        Ok(TargetingGroup {
            content_id: content_id.into(),
            click_through_rate,
            predicates,
        })
    }

    /// Id of the content item this group makes eligible.
    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    /// Click-through rate used to rank the content when this group matches.
    pub fn click_through_rate(&self) -> f64 {
        self.click_through_rate
    }

    /// Predicates that must all hold for the group to match.
    pub fn predicates(&self) -> &[Arc<dyn TargetingPredicate>] {
        &self.predicates
    }
}

impl fmt::Debug for TargetingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetingGroup")
            .field("content_id", &self.content_id)
            .field("click_through_rate", &self.click_through_rate)
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

/// A cancellation signal shared between a caller and the evaluations it started.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Create a signal that is not cancelled yet.
    pub fn new() -> Cancellation {
        Cancellation::default()
    }

    /// Cancel every evaluation observing this signal or one of its clones.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return `true` once [`Cancellation::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Evaluates targeting groups for one request.
///
/// The evaluator holds no per-evaluation state, so a single instance can be shared between
/// threads and used to evaluate many groups concurrently.
pub struct TargetingEvaluator {
    request: Arc<RequestContext>,
    pool: Arc<WorkerPool>,
    timeout: Duration,
    cancellation: Cancellation,
}

impl TargetingEvaluator {
    /// Create an evaluator for `request`. Every call to [`TargetingEvaluator::evaluate`] waits at
    /// most `timeout` for the predicates to complete.
    pub fn new(request: RequestContext, pool: Arc<WorkerPool>, timeout: Duration) -> Self {
        TargetingEvaluator {
            request: Arc::new(request),
            pool,
            timeout,
            cancellation: Cancellation::new(),
        }
    }

    /// Abort pending and future evaluations once `cancellation` is triggered.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// The request this evaluator is bound to.
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// Evaluate `targeting_group` against the request.
    ///
    /// Returns [`TargetingPredicateResult::True`] if all predicates evaluate to `True` (vacuously
    /// so for a group without predicates) and [`TargetingPredicateResult::False`] otherwise.
    /// Predicates are evaluated concurrently on the worker pool.
    ///
    /// Fails with [`Error::EvaluationTimeout`] if some predicates do not complete in time and with
    /// [`Error::Cancelled`] if the caller cancelled the evaluation.
    pub fn evaluate(&self, targeting_group: &TargetingGroup) -> Result<TargetingPredicateResult> {
        if self.cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let predicates = targeting_group.predicates();
        if predicates.is_empty() {
            return Ok(TargetingPredicateResult::True);
        }

        // A timeout too large to represent as an instant means waiting without a deadline.
        let deadline = Instant::now().checked_add(self.timeout);

        // Per-call state: each job reports into its own channel and observes its own abort flag,
        // so concurrent evaluations on the same evaluator never see each other's results.
        let (result_sender, result_receiver) = mpsc::channel::<TargetingPredicateResult>();
        let aborted = Arc::new(AtomicBool::new(false));

        for predicate in predicates {
            let predicate = Arc::clone(predicate);
            let request = Arc::clone(&self.request);
            let result_sender = result_sender.clone();
            let job_aborted = Arc::clone(&aborted);
            let submitted = self.pool.submit(move || {
                if job_aborted.load(Ordering::SeqCst) {
                    return;
                }
                // Error means that the evaluation has already given up on this result.
                let _ = result_sender.send(predicate.evaluate(&request));
            });
            if let Err(err) = submitted {
                aborted.store(true, Ordering::SeqCst);
                return Err(err);
            }
        }
        // Only jobs hold senders now. If they all finish (or panic) without reporting every
        // result, the receiver disconnects.
        drop(result_sender);

        let mut all_true = true;
        let mut pending = predicates.len();
        while pending > 0 {
            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                aborted.store(true, Ordering::SeqCst);
                log::warn!(target: "ad_selection",
                           content_id = targeting_group.content_id(),
                           pending;
                           "targeting evaluation timed out");
                return Err(Error::EvaluationTimeout {
                    timeout: self.timeout,
                    pending,
                });
            }

            let wait = deadline.map_or(CANCELLATION_POLL_INTERVAL, |deadline| {
                (deadline - now).min(CANCELLATION_POLL_INTERVAL)
            });
            match result_receiver.recv_timeout(wait) {
                Ok(result) => {
                    pending -= 1;
                    all_true &= result.is_true();
                }
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancellation.is_cancelled() {
                        aborted.store(true, Ordering::SeqCst);
                        return Err(Error::Cancelled);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::error!(target: "ad_selection",
                                content_id = targeting_group.content_id(),
                                pending;
                                "targeting predicate panicked");
                    return Err(Error::PredicatePanicked);
                }
            }
        }

        let result = TargetingPredicateResult::from(all_true);
        log::trace!(target: "ad_selection",
                    content_id = targeting_group.content_id(),
                    customer_id = self.request.customer_id(),
                    result:serde;
                    "evaluated targeting group");
        Ok(result)
    }
}
