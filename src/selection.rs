use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    AdvertisementContent, Cancellation, ContentLookup, Error, GeneratedAdvertisement,
    RequestContext, Result, SelectionConfig, SelectionEvent, SelectionLogger, TargetingEvaluator,
    TargetingGroupLookup, WorkerPool,
};

/// How to choose between eligible content items with exactly the same click-through rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TieBreak {
    /// The candidate seen first wins. Candidates are seen in the order the content lookup
    /// returns them.
    #[default]
    FirstSeen,
    /// The candidate seen last wins.
    LastSeen,
    /// Pick uniformly among tied candidates. The generator is seeded with the given value, so a
    /// selector replays the same sequence of picks.
    Random {
        /// Seed of the generator owned by the selector.
        seed: u64,
    },
}

/// Content that passed targeting, ranked by its best matching click-through rate.
struct RankedCandidate {
    click_through_rate: f64,
    content: AdvertisementContent,
}

/// Picks the advertisement to be rendered.
///
/// Use [`SelectionConfig`] to create an instance.
pub struct AdvertisementSelectionLogic<'a, C, T> {
    content_lookup: C,
    targeting_group_lookup: T,
    pool: Arc<WorkerPool>,
    evaluation_timeout: Duration,
    tie_break: TieBreak,
    /// Only present for [`TieBreak::Random`].
    rng: Option<Mutex<StdRng>>,
    selection_logger: Box<dyn SelectionLogger + Send + Sync + 'a>,
}

impl<'a, C: ContentLookup, T: TargetingGroupLookup> AdvertisementSelectionLogic<'a, C, T> {
    pub(crate) fn new(config: SelectionConfig<'a, C, T>, pool: Arc<WorkerPool>) -> Self {
        let rng = match config.tie_break {
            TieBreak::Random { seed } => Some(Mutex::new(StdRng::seed_from_u64(seed))),
            TieBreak::FirstSeen | TieBreak::LastSeen => None,
        };
        AdvertisementSelectionLogic {
            content_lookup: config.content_lookup,
            targeting_group_lookup: config.targeting_group_lookup,
            pool,
            evaluation_timeout: config.evaluation_timeout,
            tie_break: config.tie_break,
            rng,
            selection_logger: config.selection_logger,
        }
    }

    /// Get the eligible content with the highest click-through rate for `customer_id` in
    /// `marketplace_id`.
    ///
    /// Returns [`GeneratedAdvertisement::Empty`] if `marketplace_id` is empty or no content is
    /// eligible. Lookup failures and evaluation timeouts are returned as errors.
    pub fn select_advertisement(
        &self,
        customer_id: &str,
        marketplace_id: &str,
    ) -> Result<GeneratedAdvertisement> {
        self.select_advertisement_with_cancellation(customer_id, marketplace_id, Cancellation::new())
    }

    /// Same as [`AdvertisementSelectionLogic::select_advertisement`], failing with
    /// [`Error::Cancelled`] once `cancellation` is triggered.
    pub fn select_advertisement_with_cancellation(
        &self,
        customer_id: &str,
        marketplace_id: &str,
        cancellation: Cancellation,
    ) -> Result<GeneratedAdvertisement> {
        if marketplace_id.is_empty() {
            log::warn!(target: "ad_selection", customer_id;
                       "marketplace id cannot be empty, returning empty advertisement");
            return Ok(GeneratedAdvertisement::Empty);
        }

        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let contents = self
            .content_lookup
            .get(marketplace_id)
            .map_err(|source| Error::ContentLookup {
                marketplace_id: marketplace_id.to_owned(),
                source,
            })?
            .unwrap_or_default();

        if contents.is_empty() {
            log::debug!(target: "ad_selection", marketplace_id;
                        "no content available for marketplace");
            return Ok(GeneratedAdvertisement::Empty);
        }

        let evaluator = TargetingEvaluator::new(
            RequestContext::new(customer_id, marketplace_id),
            Arc::clone(&self.pool),
            self.evaluation_timeout,
        )
        .with_cancellation(cancellation.clone());

        let mut candidates = Vec::new();
        for content in contents {
            if cancellation.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let targeting_groups = self
                .targeting_group_lookup
                .get(&content.content_id)
                .map_err(|source| Error::TargetingGroupLookup {
                    content_id: content.content_id.clone(),
                    source,
                })?
                .unwrap_or_default();

            let mut best: Option<f64> = None;
            for targeting_group in &targeting_groups {
                if evaluator.evaluate(targeting_group)?.is_true() {
                    let click_through_rate = targeting_group.click_through_rate();
                    if best.map_or(true, |best| click_through_rate > best) {
                        best = Some(click_through_rate);
                    }
                }
            }

            if let Some(click_through_rate) = best {
                candidates.push(RankedCandidate {
                    click_through_rate,
                    content,
                });
            }
        }

        let eligible_content = candidates.len();
        let Some(chosen) = self.pick(candidates) else {
            log::debug!(target: "ad_selection", customer_id, marketplace_id;
                        "no eligible content, returning empty advertisement");
            return Ok(GeneratedAdvertisement::Empty);
        };

        log::trace!(target: "ad_selection",
                    customer_id,
                    marketplace_id,
                    content_id = chosen.content.content_id.as_str(),
                    click_through_rate = chosen.click_through_rate,
                    eligible_content;
                    "selected advertisement");

        self.selection_logger.log_selection(SelectionEvent {
            customer_id: customer_id.to_owned(),
            marketplace_id: marketplace_id.to_owned(),
            content_id: chosen.content.content_id.clone(),
            click_through_rate: chosen.click_through_rate,
            eligible_content,
            timestamp: Utc::now().to_rfc3339(),
        });

        Ok(GeneratedAdvertisement::Advertisement {
            content: chosen.content,
            click_through_rate: chosen.click_through_rate,
        })
    }

    /// Pick the candidate with the highest click-through rate, resolving ties with
    /// `self.tie_break`.
    fn pick(&self, candidates: Vec<RankedCandidate>) -> Option<RankedCandidate> {
        let top = candidates
            .iter()
            .map(|candidate| candidate.click_through_rate)
            .reduce(f64::max)?;

        let mut tied: Vec<RankedCandidate> = candidates
            .into_iter()
            .filter(|candidate| candidate.click_through_rate == top)
            .collect();

        match self.tie_break {
            TieBreak::FirstSeen => tied.into_iter().next(),
            TieBreak::LastSeen => tied.pop(),
            TieBreak::Random { .. } => {
                let index = match (&self.rng, tied.len()) {
                    (_, 1) => 0,
                    (Some(rng), len) => match rng.lock() {
                        Ok(mut rng) => rng.gen_range(0..len),
                        Err(_) => {
                            log::warn!(target: "ad_selection", tied = len;
                                       "tie-break generator lock is poisoned, picking first candidate");
                            0
                        }
                    },
                    (None, _) => 0,
                };
                Some(tied.swap_remove(index))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex, OnceLock,
        },
        thread,
        time::Duration,
    };

    use crate::{
        lookup::LookupResult, AdvertisementContent, Cancellation, Error, GeneratedAdvertisement,
        LookupError, MemoryStore, Operator, RequestAttribute, RequestContext, RulePredicate,
        SelectionConfig, SelectionEvent, TargetingGroup, TargetingPredicate,
        TargetingPredicateResult, TieBreak, WorkerPool, WorkerPoolConfig,
    };

    fn shared_pool() -> Arc<WorkerPool> {
        static POOL: OnceLock<Arc<WorkerPool>> = OnceLock::new();
        POOL.get_or_init(|| {
            Arc::new(WorkerPool::start(WorkerPoolConfig::new().with_threads(4)).unwrap())
        })
        .clone()
    }

    fn always(result: bool) -> Arc<dyn TargetingPredicate> {
        Arc::new(move |_: &RequestContext| TargetingPredicateResult::from(result))
    }

    /// Adds `content_id` to the marketplace with a single targeting group.
    fn add_content(store: &MemoryStore, content_id: &str, click_through_rate: f64, matches: bool) {
        add_content_with_groups(store, content_id, &[(click_through_rate, matches)]);
    }

    fn add_content_with_groups(store: &MemoryStore, content_id: &str, groups: &[(f64, bool)]) {
        let mut content = crate::ContentLookup::get(store, "marketplace")
            .unwrap()
            .unwrap_or_default();
        content.push(AdvertisementContent::new(
            content_id,
            "marketplace",
            format!("<ad id={content_id}/>"),
        ));
        store.put_content("marketplace", content);

        let groups = groups
            .iter()
            .map(|&(click_through_rate, matches)| {
                TargetingGroup::new(content_id, click_through_rate, vec![always(matches)]).unwrap()
            })
            .collect();
        store.put_targeting_groups(content_id, groups);
    }

    fn selected_id(advertisement: GeneratedAdvertisement) -> Option<String> {
        advertisement.into_content().map(|content| content.content_id)
    }

    fn select(store: &MemoryStore, tie_break: TieBreak) -> GeneratedAdvertisement {
        let mut config = SelectionConfig::new(store.clone(), store.clone());
        config.tie_break(tie_break);
        config
            .to_selection_logic(shared_pool())
            .select_advertisement("customer", "marketplace")
            .unwrap()
    }

    #[test]
    fn empty_marketplace_skips_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let content_calls = Arc::clone(&calls);
        let group_calls = Arc::clone(&calls);
        let config = SelectionConfig::new(
            move |_: &str| -> LookupResult<AdvertisementContent> {
                content_calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            move |_: &str| -> LookupResult<TargetingGroup> {
                group_calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
        );
        let selection = config.to_selection_logic(shared_pool());

        let result = selection.select_advertisement("customer", "").unwrap();

        assert!(result.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_customer_is_allowed() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        let selection = SelectionConfig::new(store.clone(), store).to_selection_logic(shared_pool());

        let result = selection.select_advertisement("", "marketplace").unwrap();

        assert_eq!(selected_id(result).as_deref(), Some("a"));
    }

    #[test]
    fn unknown_marketplace_is_empty() {
        let store = MemoryStore::new();
        assert!(select(&store, TieBreak::FirstSeen).is_empty());

        store.put_content("marketplace", vec![]);
        assert!(select(&store, TieBreak::FirstSeen).is_empty());
    }

    #[test]
    fn content_without_targeting_groups_is_skipped() {
        let store = MemoryStore::new();
        store.put_content(
            "marketplace",
            vec![AdvertisementContent::new("orphan", "marketplace", "<ad/>")],
        );
        add_content(&store, "a", 0.1, true);

        assert_eq!(selected_id(select(&store, TieBreak::FirstSeen)).as_deref(), Some("a"));
    }

    #[test]
    fn picks_highest_click_through_rate() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        add_content(&store, "b", 0.9, true);

        let result = select(&store, TieBreak::FirstSeen);

        assert_eq!(result.click_through_rate(), Some(0.9));
        assert_eq!(selected_id(result).as_deref(), Some("b"));
    }

    #[test]
    fn ignores_content_that_does_not_match() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        add_content(&store, "b", 0.9, false);

        assert_eq!(selected_id(select(&store, TieBreak::FirstSeen)).as_deref(), Some("a"));
    }

    #[test]
    fn no_match_is_empty() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, false);
        add_content(&store, "b", 0.9, false);

        assert_eq!(select(&store, TieBreak::FirstSeen), GeneratedAdvertisement::Empty);
    }

    #[test]
    fn content_ranks_by_best_matching_group() {
        let store = MemoryStore::new();
        add_content_with_groups(&store, "a", &[(0.2, true), (0.95, false), (0.8, true)]);
        add_content(&store, "b", 0.7, true);

        let result = select(&store, TieBreak::FirstSeen);

        assert_eq!(result.click_through_rate(), Some(0.8));
        assert_eq!(selected_id(result).as_deref(), Some("a"));
    }

    #[test]
    fn tie_first_seen_wins() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.7, true);
        add_content(&store, "b", 0.7, true);
        add_content(&store, "c", 0.3, true);

        for _ in 0..10 {
            assert_eq!(selected_id(select(&store, TieBreak::FirstSeen)).as_deref(), Some("a"));
        }
    }

    #[test]
    fn tie_last_seen_wins() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.7, true);
        add_content(&store, "b", 0.7, true);
        add_content(&store, "c", 0.3, true);

        for _ in 0..10 {
            assert_eq!(selected_id(select(&store, TieBreak::LastSeen)).as_deref(), Some("b"));
        }
    }

    #[test]
    fn tie_random_is_reproducible_with_seed() {
        let store = MemoryStore::new();
        add_content(&store, "low", 0.3, true);
        for content_id in ["a", "b", "c", "d"] {
            add_content(&store, content_id, 0.7, true);
        }

        let picks = |seed| {
            let mut config = SelectionConfig::new(store.clone(), store.clone());
            config.tie_break(TieBreak::Random { seed });
            let selection = config.to_selection_logic(shared_pool());
            (0..20)
                .map(|_| {
                    let advertisement = selection
                        .select_advertisement("customer", "marketplace")
                        .unwrap();
                    selected_id(advertisement)
                })
                .collect::<Vec<_>>()
        };

        let first = picks(42);
        assert_eq!(first, picks(42));
        assert!(first
            .iter()
            .all(|id| matches!(id.as_deref(), Some("a" | "b" | "c" | "d"))));
    }

    #[test]
    fn tie_random_falls_back_to_first_when_generator_is_poisoned() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.7, true);
        add_content(&store, "b", 0.7, true);
        let mut config = SelectionConfig::new(store.clone(), store);
        config.tie_break(TieBreak::Random { seed: 7 });
        let selection = config.to_selection_logic(shared_pool());

        thread::scope(|scope| {
            let poisoner = scope.spawn(|| {
                let _guard = selection.rng.as_ref().unwrap().lock().unwrap();
                panic!("poison tie-break generator");
            });
            assert!(poisoner.join().is_err());
        });

        let result = selection.select_advertisement("customer", "marketplace").unwrap();
        assert_eq!(selected_id(result).as_deref(), Some("a"));
    }

    #[test]
    fn targets_by_customer() {
        let store = MemoryStore::new();
        store.put_content(
            "marketplace",
            vec![
                AdvertisementContent::new("vip", "marketplace", "<vip/>"),
                AdvertisementContent::new("everyone", "marketplace", "<all/>"),
            ],
        );
        let vip_only: Arc<dyn TargetingPredicate> = Arc::new(RulePredicate::new(
            RequestAttribute::CustomerId,
            Operator::OneOf,
            vec!["alice".to_owned()],
        ));
        store.put_targeting_groups(
            "vip",
            vec![TargetingGroup::new("vip", 0.9, vec![vip_only]).unwrap()],
        );
        store.put_targeting_groups(
            "everyone",
            vec![TargetingGroup::new("everyone", 0.1, vec![]).unwrap()],
        );
        let selection = SelectionConfig::new(store.clone(), store).to_selection_logic(shared_pool());

        let alice = selection.select_advertisement("alice", "marketplace").unwrap();
        let bob = selection.select_advertisement("bob", "marketplace").unwrap();

        assert_eq!(selected_id(alice).as_deref(), Some("vip"));
        assert_eq!(selected_id(bob).as_deref(), Some("everyone"));
    }

    #[test]
    fn content_lookup_failure_propagates() {
        let config = SelectionConfig::new(
            |_: &str| -> LookupResult<AdvertisementContent> {
                Err(LookupError::new("store unavailable"))
            },
            |_: &str| -> LookupResult<TargetingGroup> { Ok(None) },
        );

        let result = config
            .to_selection_logic(shared_pool())
            .select_advertisement("customer", "marketplace");

        assert!(matches!(
            result,
            Err(Error::ContentLookup { marketplace_id, .. }) if marketplace_id == "marketplace"
        ));
    }

    #[test]
    fn targeting_group_lookup_failure_propagates() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        let config = SelectionConfig::new(store, |_: &str| -> LookupResult<TargetingGroup> {
            Err(LookupError::new("store unavailable"))
        });

        let result = config
            .to_selection_logic(shared_pool())
            .select_advertisement("customer", "marketplace");

        assert!(matches!(
            result,
            Err(Error::TargetingGroupLookup { content_id, .. }) if content_id == "a"
        ));
    }

    #[test]
    fn evaluation_timeout_propagates() {
        let store = MemoryStore::new();
        store.put_content(
            "marketplace",
            vec![AdvertisementContent::new("slow", "marketplace", "<ad/>")],
        );
        let slow: Arc<dyn TargetingPredicate> = Arc::new(|_: &RequestContext| {
            thread::sleep(Duration::from_secs(1));
            TargetingPredicateResult::True
        });
        store.put_targeting_groups(
            "slow",
            vec![TargetingGroup::new("slow", 0.5, vec![slow]).unwrap()],
        );
        let mut config = SelectionConfig::new(store.clone(), store);
        config.evaluation_timeout(Duration::from_millis(50));

        let result = config
            .to_selection_logic(shared_pool())
            .select_advertisement("customer", "marketplace");

        assert!(matches!(result, Err(Error::EvaluationTimeout { .. })));
    }

    #[test]
    fn cancelled_selection_fails() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        let selection = SelectionConfig::new(store.clone(), store).to_selection_logic(shared_pool());
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let result =
            selection.select_advertisement_with_cancellation("customer", "marketplace", cancellation);

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn cancelled_selection_without_targeting_groups_fails() {
        let store = MemoryStore::new();
        store.put_content(
            "marketplace",
            vec![AdvertisementContent::new("orphan", "marketplace", "<ad/>")],
        );
        let selection = SelectionConfig::new(store.clone(), store).to_selection_logic(shared_pool());
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let result =
            selection.select_advertisement_with_cancellation("customer", "marketplace", cancellation);

        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn cancelled_selection_skips_lookups() {
        let calls = Arc::new(AtomicUsize::new(0));
        let content_calls = Arc::clone(&calls);
        let config = SelectionConfig::new(
            move |_: &str| -> LookupResult<AdvertisementContent> {
                content_calls.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            },
            |_: &str| -> LookupResult<TargetingGroup> { Ok(None) },
        );
        let cancellation = Cancellation::new();
        cancellation.cancel();

        let result = config
            .to_selection_logic(shared_pool())
            .select_advertisement_with_cancellation("customer", "marketplace", cancellation);

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn logs_selection_event() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        add_content(&store, "b", 0.9, true);
        add_content(&store, "c", 0.9, false);

        let events = Arc::new(Mutex::new(Vec::<SelectionEvent>::new()));
        let mut config = SelectionConfig::new(store.clone(), store);
        {
            let events = Arc::clone(&events);
            config.selection_logger(move |event: SelectionEvent| {
                events.lock().unwrap().push(event);
            });
        }
        let selection = config.to_selection_logic(shared_pool());

        selection.select_advertisement("customer", "marketplace").unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].content_id, "b");
        assert_eq!(events[0].click_through_rate, 0.9);
        assert_eq!(events[0].eligible_content, 2);
        assert_eq!(events[0].customer_id, "customer");
    }

    #[test]
    fn does_not_log_empty_selection() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, false);

        let events = Arc::new(AtomicUsize::new(0));
        let mut config = SelectionConfig::new(store.clone(), store);
        {
            let events = Arc::clone(&events);
            config.selection_logger(move |_event: SelectionEvent| {
                events.fetch_add(1, Ordering::SeqCst);
            });
        }

        let result = config
            .to_selection_logic(shared_pool())
            .select_advertisement("customer", "marketplace")
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(events.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn selection_is_shareable_between_threads() {
        let store = MemoryStore::new();
        add_content(&store, "a", 0.5, true);
        add_content(&store, "b", 0.9, true);
        let selection =
            Arc::new(SelectionConfig::new(store.clone(), store).to_selection_logic(shared_pool()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let selection = Arc::clone(&selection);
                thread::spawn(move || {
                    selection
                        .select_advertisement(&format!("customer-{i}"), "marketplace")
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(selected_id(handle.join().unwrap()).as_deref(), Some("b"));
        }
    }
}
