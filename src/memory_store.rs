use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::{
    lookup::LookupResult, AdvertisementContent, ContentLookup, LookupError, TargetingGroup,
    TargetingGroupLookup,
};

#[derive(Default)]
struct Tables {
    content: HashMap<String, Arc<Vec<AdvertisementContent>>>,
    targeting_groups: HashMap<String, Arc<Vec<TargetingGroup>>>,
}

/// `MemoryStore` keeps content and targeting groups in memory and serves both lookups. It allows
/// concurrent access for readers and writers; clones share the same underlying tables.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set content for `marketplace_id`, returning the previous one.
    pub fn put_content(
        &self,
        marketplace_id: impl Into<String>,
        content: Vec<AdvertisementContent>,
    ) -> Option<Arc<Vec<AdvertisementContent>>> {
        // Constructing new value before requesting the lock to minimize lock span.
        let new_value = Arc::new(content);

        let mut tables = self.tables.write().ok()?;
        tables.content.insert(marketplace_id.into(), new_value)
    }

    /// Set targeting groups for `content_id`, returning the previous ones.
    pub fn put_targeting_groups(
        &self,
        content_id: impl Into<String>,
        targeting_groups: Vec<TargetingGroup>,
    ) -> Option<Arc<Vec<TargetingGroup>>> {
        let new_value = Arc::new(targeting_groups);

        let mut tables = self.tables.write().ok()?;
        tables.targeting_groups.insert(content_id.into(), new_value)
    }
}

fn poisoned() -> LookupError {
    LookupError::new("memory store lock is poisoned")
}

impl ContentLookup for MemoryStore {
    fn get(&self, marketplace_id: &str) -> LookupResult<AdvertisementContent> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .content
            .get(marketplace_id)
            .map(|content| content.as_ref().clone()))
    }
}

impl TargetingGroupLookup for MemoryStore {
    fn get(&self, content_id: &str) -> LookupResult<TargetingGroup> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .targeting_groups
            .get(content_id)
            .map(|targeting_groups| targeting_groups.as_ref().clone()))
    }
}

#[cfg(test)]
mod tests {
    use crate::{AdvertisementContent, ContentLookup, TargetingGroup, TargetingGroupLookup};

    use super::MemoryStore;

    #[test]
    fn can_put_content_from_another_thread() {
        let store = MemoryStore::new();

        {
            let store = store.clone();
            let _ = std::thread::spawn(move || {
                store.put_content(
                    "marketplace",
                    vec![AdvertisementContent::new("content", "marketplace", "<ad/>")],
                );
            })
            .join();
        }

        let content = ContentLookup::get(&store, "marketplace").unwrap().unwrap();
        assert_eq!(content.len(), 1);
    }

    #[test]
    fn unknown_keys_are_none() {
        let store = MemoryStore::new();
        assert!(ContentLookup::get(&store, "marketplace").unwrap().is_none());
        assert!(TargetingGroupLookup::get(&store, "content").unwrap().is_none());
    }

    #[test]
    fn put_returns_previous_value() {
        let store = MemoryStore::new();
        let group = TargetingGroup::new("content", 0.1, vec![]).unwrap();

        assert!(store.put_targeting_groups("content", vec![group.clone()]).is_none());
        let previous = store.put_targeting_groups("content", vec![group.clone(), group]);

        assert_eq!(previous.map(|groups| groups.len()), Some(1));
        let current = TargetingGroupLookup::get(&store, "content").unwrap().unwrap();
        assert_eq!(current.len(), 2);
    }
}
