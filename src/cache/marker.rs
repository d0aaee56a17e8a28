//! Rendition records: persisted descriptor and dependency snapshots.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::domain::fragments::{
    CacheKey, FragmentDependencies, FragmentDescriptor, FragmentId, RenditionRecord, TenantScope,
};
use crate::infra::store::{ContentStore, StoreError};

use super::keys::{FRAGMENTS_ROOT, RENDITIONS_ROOT, fragment_path, rendition_path};
use super::registry::{RenditionKey, RenditionRegistry};

#[derive(Debug, Error)]
pub enum RenditionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode rendition record for `{fragment}`")]
    Encode {
        fragment: FragmentId,
        #[source]
        source: serde_json::Error,
    },
    #[error("rendition record at `{path}` is malformed")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Persists the association between a rendered fragment and its dependencies.
#[async_trait]
pub trait RenditionMarker: Send + Sync {
    /// Store the latest snapshot for the descriptor's key, replacing older ones.
    async fn mark(
        &self,
        descriptor: &FragmentDescriptor,
        dependencies: &FragmentDependencies,
    ) -> Result<(), RenditionError>;

    /// Read back the record for a rendered fragment, if one exists.
    async fn lookup(
        &self,
        fragment: &FragmentId,
        key: &CacheKey,
    ) -> Result<Option<RenditionRecord>, RenditionError>;
}

/// Outcome of an invalidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eviction {
    pub renditions: Vec<RenditionKey>,
    pub artifacts_removed: usize,
}

/// Rendition marker backed by JSON records in a tenant-scoped store.
pub struct RenditionLedger {
    scope: TenantScope,
    store: Arc<dyn ContentStore>,
    registry: Arc<RenditionRegistry>,
}

impl RenditionLedger {
    pub fn new(
        scope: TenantScope,
        store: Arc<dyn ContentStore>,
        registry: Arc<RenditionRegistry>,
    ) -> Self {
        Self {
            scope,
            store,
            registry,
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Index every record persisted for this scope. Malformed records are skipped.
    pub async fn load(&self) -> Result<usize, RenditionError> {
        let paths = self.store.list(RENDITIONS_ROOT).await?;
        let mut loaded = 0;
        for path in paths {
            let Some(bytes) = self.store.read(&path).await? else {
                continue;
            };
            match decode(&path, &bytes) {
                Ok(record) => {
                    self.registry.register(&self.scope, record);
                    loaded += 1;
                }
                Err(err) => warn!(
                    op = "ledger::load",
                    scope = %self.scope,
                    path = %path,
                    error = %err,
                    "Skipping malformed rendition record"
                ),
            }
        }
        debug!(op = "ledger::load", scope = %self.scope, loaded, "Rendition records indexed");
        Ok(loaded)
    }

    /// Records whose render required `dependency`.
    pub async fn records_requiring(
        &self,
        dependency: &str,
    ) -> Result<Vec<RenditionRecord>, RenditionError> {
        self.load().await?;
        Ok(self
            .registry
            .keys_for_dependency(&self.scope, dependency)
            .iter()
            .filter_map(|key| self.registry.record(key))
            .collect())
    }

    /// Remove the artifacts and records of every rendition requiring `dependency`.
    pub async fn evict_dependency(&self, dependency: &str) -> Result<Eviction, RenditionError> {
        self.load().await?;
        let keys = self.registry.keys_for_dependency(&self.scope, dependency);
        let mut eviction = Eviction::default();
        for key in keys {
            if self
                .store
                .remove(&fragment_path(&key.fragment_id, &key.cache_key))
                .await?
            {
                eviction.artifacts_removed += 1;
            }
            self.store
                .remove(&rendition_path(&key.fragment_id, &key.cache_key))
                .await?;
            self.registry.unregister(&key);
            eviction.renditions.push(key);
        }
        debug!(
            op = "ledger::evict",
            scope = %self.scope,
            dependency,
            renditions = eviction.renditions.len(),
            artifacts = eviction.artifacts_removed,
            "Evicted dependent renditions"
        );
        Ok(eviction)
    }

    /// Remove every fragment artifact and rendition record of this scope.
    pub async fn purge(&self) -> Result<usize, RenditionError> {
        let mut removed = 0;
        for root in [FRAGMENTS_ROOT, RENDITIONS_ROOT] {
            for path in self.store.list(root).await? {
                if self.store.remove(&path).await? {
                    removed += 1;
                }
            }
        }
        self.registry.clear_scope(&self.scope);
        Ok(removed)
    }
}

#[async_trait]
impl RenditionMarker for RenditionLedger {
    async fn mark(
        &self,
        descriptor: &FragmentDescriptor,
        dependencies: &FragmentDependencies,
    ) -> Result<(), RenditionError> {
        let record = RenditionRecord {
            descriptor: descriptor.clone(),
            dependencies: dependencies.clone(),
            rendered_at: OffsetDateTime::now_utc(),
        };
        let encoded =
            serde_json::to_vec_pretty(&record).map_err(|source| RenditionError::Encode {
                fragment: descriptor.fragment_id.clone(),
                source,
            })?;

        let path = rendition_path(&descriptor.fragment_id, &descriptor.cache_key);
        self.store.write(&path, Bytes::from(encoded)).await?;
        self.registry.register(&self.scope, record);
        Ok(())
    }

    async fn lookup(
        &self,
        fragment: &FragmentId,
        key: &CacheKey,
    ) -> Result<Option<RenditionRecord>, RenditionError> {
        let rendition = RenditionKey::new(self.scope.clone(), fragment.clone(), key.clone());
        if let Some(record) = self.registry.record(&rendition) {
            return Ok(Some(record));
        }

        let path = rendition_path(fragment, key);
        let Some(bytes) = self.store.read(&path).await? else {
            return Ok(None);
        };
        let record = decode(&path, &bytes)?;
        self.registry.register(&self.scope, record.clone());
        Ok(Some(record))
    }
}

fn decode(path: &str, bytes: &[u8]) -> Result<RenditionRecord, RenditionError> {
    serde_json::from_slice(bytes).map_err(|source| RenditionError::Decode {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys::derive_cache_key;
    use crate::domain::fragments::{PageDescriptor, RequirementSet, Scope};
    use crate::infra::store::MemoryContentStore;

    fn ledger() -> (RenditionLedger, Arc<dyn ContentStore>, Arc<RenditionRegistry>) {
        let store: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let registry = Arc::new(RenditionRegistry::new());
        let scope = TenantScope::new("acme", "master").expect("valid scope");
        (
            RenditionLedger::new(scope, Arc::clone(&store), Arc::clone(&registry)),
            store,
            registry,
        )
    }

    fn descriptor(fragment: &str, ledger: &RenditionLedger) -> FragmentDescriptor {
        let fragment_id = FragmentId::new(fragment).expect("valid id");
        let key = derive_cache_key(&fragment_id, &RequirementSet::new());
        let page = PageDescriptor::new(ledger.scope(), "home");
        FragmentDescriptor::fragment(fragment_id, key, Some(&page))
    }

    fn requiring(items: &[&str]) -> FragmentDependencies {
        let mut dependencies = FragmentDependencies::default();
        dependencies
            .requires
            .extend(items.iter().map(|item| item.to_string()));
        dependencies
    }

    #[tokio::test]
    async fn mark_persists_a_readable_record() {
        let (ledger, store, registry) = ledger();
        let descriptor = descriptor("hero", &ledger);
        ledger
            .mark(&descriptor, &requiring(&["page:home"]))
            .await
            .expect("mark");

        let path = rendition_path(&descriptor.fragment_id, &descriptor.cache_key);
        let raw = store.read(&path).await.expect("read").expect("record stored");
        let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(value["descriptor"]["scope"], "FRAGMENT");
        assert_eq!(registry.key_count(), 1);

        registry.clear();
        let record = ledger
            .lookup(&descriptor.fragment_id, &descriptor.cache_key)
            .await
            .expect("lookup")
            .expect("record present");
        assert_eq!(record.descriptor.scope, Scope::Fragment);
        assert!(record.dependencies.requires.contains("page:home"));
    }

    #[tokio::test]
    async fn marking_twice_keeps_latest_snapshot() {
        let (ledger, _, registry) = ledger();
        let descriptor = descriptor("hero", &ledger);
        ledger
            .mark(&descriptor, &requiring(&["page:home"]))
            .await
            .expect("mark");
        ledger
            .mark(&descriptor, &requiring(&["page:about"]))
            .await
            .expect("mark");

        let record = ledger
            .lookup(&descriptor.fragment_id, &descriptor.cache_key)
            .await
            .expect("lookup")
            .expect("present");
        assert!(record.dependencies.requires.contains("page:about"));
        assert!(!record.dependencies.requires.contains("page:home"));
        assert_eq!(registry.key_count(), 1);
    }

    #[tokio::test]
    async fn evict_removes_dependent_artifacts_only() {
        let (ledger, store, registry) = ledger();
        let hero = descriptor("hero", &ledger);
        let footer = descriptor("footer", &ledger);
        for (descriptor, deps) in [(&hero, ["page:home"]), (&footer, ["page:about"])] {
            store
                .write(
                    &fragment_path(&descriptor.fragment_id, &descriptor.cache_key),
                    Bytes::from("<p/>"),
                )
                .await
                .expect("write");
            ledger.mark(descriptor, &requiring(&deps)).await.expect("mark");
        }
        registry.clear();

        let eviction = ledger.evict_dependency("page:home").await.expect("evict");
        assert_eq!(eviction.renditions.len(), 1);
        assert_eq!(eviction.artifacts_removed, 1);
        assert!(
            store
                .read(&fragment_path(&hero.fragment_id, &hero.cache_key))
                .await
                .expect("read")
                .is_none()
        );
        assert!(
            store
                .read(&fragment_path(&footer.fragment_id, &footer.cache_key))
                .await
                .expect("read")
                .is_some()
        );
    }

    #[tokio::test]
    async fn load_skips_malformed_records() {
        let (ledger, store, _) = ledger();
        store
            .write("renditions/hero/broken.json", Bytes::from("not json"))
            .await
            .expect("write");
        let descriptor = descriptor("footer", &ledger);
        ledger
            .mark(&descriptor, &requiring(&["page:home"]))
            .await
            .expect("mark");

        assert_eq!(ledger.load().await.expect("load"), 1);
    }

    #[tokio::test]
    async fn purge_clears_scope() {
        let (ledger, store, registry) = ledger();
        let descriptor = descriptor("hero", &ledger);
        store
            .write(
                &fragment_path(&descriptor.fragment_id, &descriptor.cache_key),
                Bytes::from("<p/>"),
            )
            .await
            .expect("write");
        ledger
            .mark(&descriptor, &requiring(&["page:home"]))
            .await
            .expect("mark");

        assert_eq!(ledger.purge().await.expect("purge"), 2);
        assert_eq!(registry.key_count(), 0);
        assert!(store.list("").await.expect("list").is_empty());
    }
}
