//! Process-wide index of rendition records.
//!
//! Maps each dependency to the renditions that require it, and each rendition
//! to its most recent record, so a content change can find exactly the
//! fragments it invalidates.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use crate::domain::fragments::{CacheKey, FragmentId, RenditionRecord, TenantScope};

use super::lock;

/// Identity of one stored rendition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenditionKey {
    pub scope: TenantScope,
    pub fragment_id: FragmentId,
    pub cache_key: CacheKey,
}

impl RenditionKey {
    pub fn new(scope: TenantScope, fragment_id: FragmentId, cache_key: CacheKey) -> Self {
        Self {
            scope,
            fragment_id,
            cache_key,
        }
    }

    pub fn for_record(scope: &TenantScope, record: &RenditionRecord) -> Self {
        Self::new(
            scope.clone(),
            record.descriptor.fragment_id.clone(),
            record.descriptor.cache_key.clone(),
        )
    }
}

#[derive(Default)]
struct Index {
    by_dependency: HashMap<(TenantScope, String), BTreeSet<RenditionKey>>,
    records: HashMap<RenditionKey, RenditionRecord>,
}

impl Index {
    fn detach(&mut self, key: &RenditionKey) -> Option<RenditionRecord> {
        let record = self.records.remove(key)?;
        for dependency in &record.dependencies.requires {
            let slot = (key.scope.clone(), dependency.clone());
            if let Some(keys) = self.by_dependency.get_mut(&slot) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_dependency.remove(&slot);
                }
            }
        }
        Some(record)
    }
}

pub struct RenditionRegistry {
    index: RwLock<Index>,
}

impl RenditionRegistry {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(Index::default()),
        }
    }

    /// Record the latest rendition for its key, replacing any earlier record.
    pub fn register(&self, scope: &TenantScope, record: RenditionRecord) {
        let key = RenditionKey::for_record(scope, &record);
        let mut index = lock::write(&self.index, "registry::register");
        index.detach(&key);
        for dependency in &record.dependencies.requires {
            index
                .by_dependency
                .entry((scope.clone(), dependency.clone()))
                .or_default()
                .insert(key.clone());
        }
        index.records.insert(key, record);
    }

    /// Renditions in `scope` that required `dependency`, in key order.
    pub fn keys_for_dependency(&self, scope: &TenantScope, dependency: &str) -> Vec<RenditionKey> {
        lock::read(&self.index, "registry::keys_for_dependency")
            .by_dependency
            .get(&(scope.clone(), dependency.to_string()))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record(&self, key: &RenditionKey) -> Option<RenditionRecord> {
        lock::read(&self.index, "registry::record")
            .records
            .get(key)
            .cloned()
    }

    /// Forget a rendition and its dependency edges.
    pub fn unregister(&self, key: &RenditionKey) -> Option<RenditionRecord> {
        lock::write(&self.index, "registry::unregister").detach(key)
    }

    /// Forget every rendition of one tenant scope, returning the removed keys.
    pub fn clear_scope(&self, scope: &TenantScope) -> Vec<RenditionKey> {
        let mut index = lock::write(&self.index, "registry::clear_scope");
        let mut keys: Vec<RenditionKey> = index
            .records
            .keys()
            .filter(|key| &key.scope == scope)
            .cloned()
            .collect();
        keys.sort();
        for key in &keys {
            index.detach(key);
        }
        keys
    }

    pub fn clear(&self) {
        let mut index = lock::write(&self.index, "registry::clear");
        index.by_dependency.clear();
        index.records.clear();
    }

    pub fn dependency_count(&self) -> usize {
        lock::read(&self.index, "registry::dependency_count")
            .by_dependency
            .len()
    }

    pub fn key_count(&self) -> usize {
        lock::read(&self.index, "registry::key_count").records.len()
    }
}

impl Default for RenditionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
