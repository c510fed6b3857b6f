use serde::{Deserialize, Serialize};

use crate::RequestContext;

/// Outcome of evaluating a single targeting predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetingPredicateResult {
    /// The request satisfies the predicate.
    True,
    /// The request does not satisfy the predicate.
    False,
    /// The predicate could not be applied to the request (e.g., missing data). Treated as not
    /// satisfied when a targeting group is evaluated.
    Indeterminate,
}

impl TargetingPredicateResult {
    /// Return `true` only for [`TargetingPredicateResult::True`].
    pub fn is_true(self) -> bool {
        self == TargetingPredicateResult::True
    }

    /// Flip `True` and `False`. `Indeterminate` stays as is.
    pub fn invert(self) -> Self {
        match self {
            Self::True => Self::False,
            Self::False => Self::True,
            Self::Indeterminate => Self::Indeterminate,
        }
    }
}

impl From<bool> for TargetingPredicateResult {
    fn from(value: bool) -> Self {
        if value {
            Self::True
        } else {
            Self::False
        }
    }
}

/// A single eligibility rule evaluated against a request.
///
/// Predicates are evaluated concurrently on worker threads, so implementations must be `Send +
/// Sync` and should not depend on evaluation order.
pub trait TargetingPredicate: Send + Sync {
    /// Apply the predicate to `request`.
    fn evaluate(&self, request: &RequestContext) -> TargetingPredicateResult;
}

impl<T: Fn(&RequestContext) -> TargetingPredicateResult + Send + Sync> TargetingPredicate for T {
    fn evaluate(&self, request: &RequestContext) -> TargetingPredicateResult {
        self(request)
    }
}

/// Wraps a predicate and inverts its result.
#[derive(Debug, Clone)]
pub struct Inverse<P>(pub P);

impl<P: TargetingPredicate> TargetingPredicate for Inverse<P> {
    fn evaluate(&self, request: &RequestContext) -> TargetingPredicateResult {
        self.0.evaluate(request).invert()
    }
}
