use std::{fmt, sync::Arc};

use crate::{AdvertisementContent, TargetingGroup};

/// Failure reported by a lookup, e.g. when the underlying store is unavailable.
#[derive(Clone)]
pub struct LookupError(Arc<dyn std::error::Error + Send + Sync>);

impl LookupError {
    /// Wrap the failure reported by the underlying store.
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        LookupError(Arc::from(source.into()))
    }
}

impl fmt::Debug for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for LookupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Result of a lookup. `Ok(None)` means that nothing is known about the key.
pub type LookupResult<T> = std::result::Result<Option<Vec<T>>, LookupError>;

/// Source of advertisement content for a marketplace.
pub trait ContentLookup {
    /// Get all content available in `marketplace_id`.
    fn get(&self, marketplace_id: &str) -> LookupResult<AdvertisementContent>;
}

/// Source of targeting groups for a content item.
pub trait TargetingGroupLookup {
    /// Get all targeting groups owned by `content_id`.
    fn get(&self, content_id: &str) -> LookupResult<TargetingGroup>;
}

impl<T: Fn(&str) -> LookupResult<AdvertisementContent>> ContentLookup for T {
    fn get(&self, marketplace_id: &str) -> LookupResult<AdvertisementContent> {
        self(marketplace_id)
    }
}

impl<T: Fn(&str) -> LookupResult<TargetingGroup>> TargetingGroupLookup for T {
    fn get(&self, content_id: &str) -> LookupResult<TargetingGroup> {
        self(content_id)
    }
}
