//! Byte-oriented content store used to persist fragment artifacts.
//!
//! Paths are relative, slash separated and never escape the store root.
//! Every backend returns complete artifacts or nothing: a reader never
//! observes a partially written file.

mod fs;
mod memory;
mod scoped;

use std::path::{Component, Path};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::config::{StoreBackend, StoreSettings};
use crate::domain::fragments::TenantScope;

pub use fs::FsContentStore;
pub use memory::MemoryContentStore;
pub use scoped::{ScopedStore, TimedStore};

/// Errors raised by content store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store path `{path}`")]
    InvalidPath { path: String },
    #[error("store {op} failed for `{path}`")]
    Io {
        op: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("store {op} timed out after {timeout_ms} ms for `{path}`")]
    Timeout {
        op: &'static str,
        path: String,
        timeout_ms: u64,
    },
    #[error("stored artifact `{path}` is corrupt: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: &str, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_string(),
            source,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Hierarchical byte store addressed by relative paths.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Stable identity of the backing store, used in logs.
    fn id(&self) -> &str;

    /// Read a complete artifact. `Ok(None)` means the artifact does not exist.
    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError>;

    /// Write a complete artifact, replacing any previous content.
    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError>;

    /// Remove an artifact. Returns false when nothing was stored.
    async fn remove(&self, path: &str) -> Result<bool, StoreError>;

    /// List artifact paths below `prefix`, sorted. An empty prefix lists everything.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Validate and normalise a relative store path.
pub(crate) fn normalize_path(path: &str) -> Result<String, StoreError> {
    let invalid = || StoreError::InvalidPath {
        path: path.to_string(),
    };

    if path.is_empty() || path.contains('\\') || path.contains('\0') {
        return Err(invalid());
    }

    let relative = Path::new(path);
    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                segments.push(segment.to_str().ok_or_else(invalid)?);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid());
            }
        }
    }

    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments.join("/"))
}

/// Normalise a listing prefix, where the empty prefix addresses the root.
pub(crate) fn normalize_prefix(prefix: &str) -> Result<String, StoreError> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        Ok(String::new())
    } else {
        normalize_path(trimmed)
    }
}

/// Tenant-scoped store bindings, created on first use and reused afterwards.
///
/// Owned by the application and injected where needed; `reset` drops every
/// binding so the next request rebuilds it.
pub struct ContentStores {
    backend: Arc<dyn ContentStore>,
    bound: DashMap<TenantScope, Arc<dyn ContentStore>>,
}

impl ContentStores {
    /// Wrap a backend, applying `timeout` to every operation when provided.
    pub fn new(backend: Arc<dyn ContentStore>, timeout: Option<Duration>) -> Self {
        let backend: Arc<dyn ContentStore> = match timeout {
            Some(limit) => Arc::new(TimedStore::new(backend, limit)),
            None => backend,
        };
        Self {
            backend,
            bound: DashMap::new(),
        }
    }

    /// Open the configured backend.
    pub fn open(settings: &StoreSettings) -> Result<Self, StoreError> {
        let backend: Arc<dyn ContentStore> = match settings.backend {
            StoreBackend::Filesystem => Arc::new(FsContentStore::new(settings.root.clone())?),
            StoreBackend::Memory => Arc::new(MemoryContentStore::new()),
        };
        debug!(
            op = "content_stores::open",
            backend = backend.id(),
            timeout_ms = settings.timeout.map(|limit| limit.as_millis() as u64),
            "Content store opened"
        );
        Ok(Self::new(backend, settings.timeout))
    }

    /// Obtain the store rooted at the tenant/branch prefix.
    pub fn bind(&self, scope: &TenantScope) -> Arc<dyn ContentStore> {
        if let Some(existing) = self.bound.get(scope) {
            return Arc::clone(existing.value());
        }

        let entry = self.bound.entry(scope.clone()).or_insert_with(|| {
            debug!(
                op = "content_stores::bind",
                backend = self.backend.id(),
                scope = %scope,
                "Binding tenant content store"
            );
            Arc::new(ScopedStore::new(Arc::clone(&self.backend), scope))
        });
        Arc::clone(entry.value())
    }

    /// Drop every cached binding.
    pub fn reset(&self) {
        self.bound.clear();
    }

    pub fn bound_count(&self) -> usize {
        self.bound.len()
    }

    pub fn backend(&self) -> &Arc<dyn ContentStore> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rejects_escaping_paths() {
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("/abs/path").is_err());
        assert!(normalize_path("a\\b").is_err());
        assert!(normalize_path("").is_err());
        assert!(normalize_path("fragments/../x").is_err());
    }

    #[test]
    fn normalize_collapses_redundant_segments() {
        assert_eq!(
            normalize_path("fragments/./hero//key/fragment.html").expect("valid"),
            "fragments/hero/key/fragment.html"
        );
    }

    #[test]
    fn empty_prefix_addresses_root() {
        assert_eq!(normalize_prefix("").expect("valid"), "");
        assert_eq!(normalize_prefix("fragments/").expect("valid"), "fragments");
    }

    #[tokio::test]
    async fn bindings_are_reused_until_reset() {
        let stores = ContentStores::new(Arc::new(MemoryContentStore::new()), None);
        let scope = TenantScope::new("acme", "master").expect("valid scope");

        let first = stores.bind(&scope);
        let second = stores.bind(&scope);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(stores.bound_count(), 1);

        stores.reset();
        assert_eq!(stores.bound_count(), 0);
        let third = stores.bind(&scope);
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[tokio::test]
    async fn scoped_bindings_do_not_share_artifacts() {
        let stores = ContentStores::new(Arc::new(MemoryContentStore::new()), None);
        let acme = stores.bind(&TenantScope::new("acme", "master").expect("valid"));
        let globex = stores.bind(&TenantScope::new("globex", "master").expect("valid"));

        acme.write("fragments/hero/k/fragment.html", Bytes::from("acme"))
            .await
            .expect("write");

        assert!(
            globex
                .read("fragments/hero/k/fragment.html")
                .await
                .expect("read")
                .is_none()
        );
        assert_eq!(
            stores
                .backend()
                .read("acme/master/fragments/hero/k/fragment.html")
                .await
                .expect("read"),
            Some(Bytes::from("acme"))
        );
    }
}
