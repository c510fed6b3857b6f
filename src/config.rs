use std::{sync::Arc, time::Duration};

use crate::{
    selection_logger::NoopSelectionLogger, AdvertisementSelectionLogic, ContentLookup,
    SelectionLogger, TargetingGroupLookup, TieBreak, WorkerPool,
};

/// Configuration for [`AdvertisementSelectionLogic`].
pub struct SelectionConfig<'a, C, T> {
    pub(crate) content_lookup: C,
    pub(crate) targeting_group_lookup: T,
    pub(crate) evaluation_timeout: Duration,
    pub(crate) tie_break: TieBreak,
    pub(crate) selection_logger: Box<dyn SelectionLogger + Send + Sync + 'a>,
}

impl<'a, C: ContentLookup, T: TargetingGroupLookup> SelectionConfig<'a, C, T> {
    /// Default upper bound on how long a single targeting group evaluation may take.
    pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a default configuration reading from the given lookups.
    ///
    /// ```
    /// # use ad_selection::{MemoryStore, SelectionConfig};
    /// let store = MemoryStore::new();
    /// SelectionConfig::new(store.clone(), store);
    /// ```
    pub fn new(content_lookup: C, targeting_group_lookup: T) -> Self {
        SelectionConfig {
            content_lookup,
            targeting_group_lookup,
            evaluation_timeout: Self::DEFAULT_EVALUATION_TIMEOUT,
            tie_break: TieBreak::default(),
            selection_logger: Box::new(NoopSelectionLogger),
        }
    }

    /// Override how long a targeting group evaluation may wait for its predicates.
    pub fn evaluation_timeout(&mut self, evaluation_timeout: Duration) -> &mut Self {
        self.evaluation_timeout = evaluation_timeout;
        self
    }

    /// Choose how content with equal click-through rates is ranked.
    pub fn tie_break(&mut self, tie_break: TieBreak) -> &mut Self {
        self.tie_break = tie_break;
        self
    }

    /// Set selection logger to record every chosen advertisement.
    ///
    /// ```
    /// # use ad_selection::{MemoryStore, SelectionConfig, SelectionEvent};
    /// let store = MemoryStore::new();
    /// let mut config = SelectionConfig::new(store.clone(), store);
    /// config.selection_logger(|event: SelectionEvent| {
    ///   println!("{:?}", event);
    /// });
    /// ```
    pub fn selection_logger(
        &mut self,
        selection_logger: impl SelectionLogger + Send + Sync + 'a,
    ) -> &mut Self {
        self.selection_logger = Box::new(selection_logger);
        self
    }

    /// Create a new [`AdvertisementSelectionLogic`] evaluating targeting on `pool`.
    pub fn to_selection_logic(self, pool: Arc<WorkerPool>) -> AdvertisementSelectionLogic<'a, C, T> {
        AdvertisementSelectionLogic::new(self, pool)
    }
}
