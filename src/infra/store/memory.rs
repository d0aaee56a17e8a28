use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use uuid::Uuid;

use super::{ContentStore, StoreError, normalize_path, normalize_prefix};

/// In-process store, used for tests and the `memory` backend.
#[derive(Debug)]
pub struct MemoryContentStore {
    id: String,
    entries: DashMap<String, Bytes>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self {
            id: format!("memory:{}", Uuid::new_v4()),
            entries: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let key = normalize_path(path)?;
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let key = normalize_path(path)?;
        self.entries.insert(key, bytes);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<bool, StoreError> {
        let key = normalize_path(path)?;
        Ok(self.entries.remove(&key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let prefix = normalize_prefix(prefix)?;
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| {
                prefix.is_empty()
                    || key
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}
