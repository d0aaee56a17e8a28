//! Operator-facing cache maintenance: key derivation, inspection and invalidation.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::info;

use crate::cache::{Eviction, derive_cache_key, filter_requirements, fragment_path};
use crate::domain::fragments::{CacheKey, FragmentId, RenditionRecord, RequirementSet, TenantScope};

use super::error::AppError;
use super::render::FragmentCache;

pub struct CacheMaintenance {
    cache: Arc<FragmentCache>,
}

impl CacheMaintenance {
    pub fn new(cache: Arc<FragmentCache>) -> Self {
        Self { cache }
    }

    /// Derive the key a fragment would be cached under for resolved requirement values.
    pub fn derive_key(
        fragment: &str,
        requirements: &[(String, String)],
    ) -> Result<(FragmentId, CacheKey), AppError> {
        let fragment = FragmentId::new(fragment)?;
        let mut set = RequirementSet::new();
        for (name, value) in requirements {
            if set.get(name).is_some() {
                return Err(AppError::validation(format!(
                    "requirement `{name}` given more than once"
                )));
            }
            set.insert(name.clone(), Value::String(value.clone()));
        }
        let key = derive_cache_key(&fragment, &filter_requirements(set));
        Ok((fragment, key))
    }

    /// Stored output of one rendered fragment.
    pub async fn show(
        &self,
        scope: &TenantScope,
        fragment: &str,
        key: &str,
    ) -> Result<Bytes, AppError> {
        let fragment = FragmentId::new(fragment)?;
        let key = CacheKey::parse(key)?;
        let path = fragment_path(&fragment, &key);
        self.cache
            .stores()
            .bind(scope)
            .read(&path)
            .await?
            .ok_or_else(|| AppError::not_found(format!("fragment artifact `{scope}/{path}`")))
    }

    /// Rendition records in `scope` whose render required `dependency`.
    pub async fn lookup(
        &self,
        scope: &TenantScope,
        dependency: &str,
    ) -> Result<Vec<RenditionRecord>, AppError> {
        let records = self
            .cache
            .ledger(scope)
            .records_requiring(dependency)
            .await?;
        info!(
            op = "maintenance::lookup",
            scope = %scope,
            dependency,
            renditions = records.len(),
            "Dependent renditions listed"
        );
        Ok(records)
    }

    /// Remove every cached fragment in `scope` that required `dependency`.
    pub async fn evict(&self, scope: &TenantScope, dependency: &str) -> Result<Eviction, AppError> {
        let eviction = self.cache.ledger(scope).evict_dependency(dependency).await?;
        info!(
            op = "maintenance::evict",
            scope = %scope,
            dependency,
            renditions = eviction.renditions.len(),
            artifacts = eviction.artifacts_removed,
            "Dependent renditions evicted"
        );
        Ok(eviction)
    }

    /// Remove every cached fragment and rendition record in `scope`.
    pub async fn purge(&self, scope: &TenantScope) -> Result<usize, AppError> {
        let removed = self.cache.ledger(scope).purge().await?;
        info!(
            op = "maintenance::purge",
            scope = %scope,
            removed,
            "Tenant fragment cache purged"
        );
        Ok(removed)
    }
}
