//! Targeting evaluation and advertisement selection.
//!
//! # Overview
//!
//! The crate picks, for a customer and a marketplace, the advertisement with the highest
//! click-through rate among those whose targeting matches the request. Selection is done by
//! [`AdvertisementSelectionLogic`], which reads content and targeting groups through the
//! [`ContentLookup`] and [`TargetingGroupLookup`] traits and produces a
//! [`GeneratedAdvertisement`].
//!
//! A [`TargetingGroup`] bundles [`TargetingPredicate`]s with a click-through rate. A
//! [`TargetingEvaluator`] dispatches every predicate of a group to a shared [`WorkerPool`] and
//! reduces the results with logical AND. Evaluation waits for a bounded time only; predicates that
//! do not complete in time fail the selection with [`Error::EvaluationTimeout`].
//!
//! A [`SelectionLogger`] can be provided to record every chosen advertisement.
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Business-level outcomes (empty marketplace id, no content, no eligible content) are not
//! errors and result in [`GeneratedAdvertisement::Empty`]. Lookup failures, timeouts and
//! cancellation are returned to the caller, which decides on a fallback.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `ad_selection` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into selection.
//!
//! # Examples
//!
//! ```
//! # use std::sync::Arc;
//! # use ad_selection::*;
//! let pool = Arc::new(WorkerPool::start(WorkerPoolConfig::new())?);
//!
//! let store = MemoryStore::new();
//! store.put_content(
//!     "us",
//!     vec![AdvertisementContent::new("spring-sale", "us", "<ad>Spring sale</ad>")],
//! );
//! store.put_targeting_groups(
//!     "spring-sale",
//!     vec![TargetingGroup::new("spring-sale", 0.05, vec![])?],
//! );
//!
//! let selection = SelectionConfig::new(store.clone(), store).to_selection_logic(pool.clone());
//! let advertisement = selection.select_advertisement("customer-1", "us")?;
//! assert_eq!(advertisement.content().map(|c| c.content_id.as_str()), Some("spring-sale"));
//!
//! pool.shutdown()?;
//! # Ok::<(), ad_selection::Error>(())
//! ```

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod config;
mod error;
mod lookup;
mod memory_store;
mod model;
mod predicate;
mod rules;
mod selection;
mod selection_logger;
mod targeting;
mod worker_pool;

pub use config::SelectionConfig;
pub use error::{Error, Result};
pub use lookup::{ContentLookup, LookupError, LookupResult, TargetingGroupLookup};
pub use memory_store::MemoryStore;
pub use model::{AdvertisementContent, GeneratedAdvertisement, RequestContext};
pub use predicate::{Inverse, TargetingPredicate, TargetingPredicateResult};
pub use rules::{Operator, RequestAttribute, RulePredicate, RuleValue};
pub use selection::{AdvertisementSelectionLogic, TieBreak};
pub use selection_logger::{SelectionEvent, SelectionLogger};
pub use targeting::{Cancellation, TargetingEvaluator, TargetingGroup};
pub use worker_pool::{WorkerPool, WorkerPoolConfig};
