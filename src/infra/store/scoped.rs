use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::fragments::TenantScope;

use super::{ContentStore, StoreError, normalize_path, normalize_prefix};

/// View of a backend rooted under `{tenant}/{branch}`.
pub struct ScopedStore {
    id: String,
    prefix: String,
    inner: Arc<dyn ContentStore>,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn ContentStore>, scope: &TenantScope) -> Self {
        let prefix = scope.path_prefix();
        Self {
            id: format!("{}#{prefix}", inner.id()),
            prefix,
            inner,
        }
    }

    fn qualify(&self, path: &str) -> Result<String, StoreError> {
        Ok(format!("{}/{}", self.prefix, normalize_path(path)?))
    }
}

#[async_trait]
impl ContentStore for ScopedStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.qualify(path)?;
        self.inner.read(&path).await
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.qualify(path)?;
        self.inner.write(&path, bytes).await
    }

    async fn remove(&self, path: &str) -> Result<bool, StoreError> {
        let path = self.qualify(path)?;
        self.inner.remove(&path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let relative = normalize_prefix(prefix)?;
        let qualified = if relative.is_empty() {
            self.prefix.clone()
        } else {
            format!("{}/{relative}", self.prefix)
        };
        let strip = format!("{}/", self.prefix);
        Ok(self
            .inner
            .list(&qualified)
            .await?
            .into_iter()
            .filter_map(|path| path.strip_prefix(strip.as_str()).map(str::to_string))
            .collect())
    }
}

/// Applies a deadline to every operation of the wrapped store.
pub struct TimedStore {
    inner: Arc<dyn ContentStore>,
    limit: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn ContentStore>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        path: &str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                path: path.to_string(),
                timeout_ms: u64::try_from(self.limit.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[async_trait]
impl ContentStore for TimedStore {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        self.bounded("read", path, self.inner.read(path)).await
    }

    async fn write(&self, path: &str, bytes: Bytes) -> Result<(), StoreError> {
        self.bounded("write", path, self.inner.write(path, bytes))
            .await
    }

    async fn remove(&self, path: &str) -> Result<bool, StoreError> {
        self.bounded("remove", path, self.inner.remove(path)).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.bounded("list", prefix, self.inner.list(prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::store::MemoryContentStore;

    struct StalledStore;

    #[async_trait]
    impl ContentStore for StalledStore {
        fn id(&self) -> &str {
            "stalled"
        }

        async fn read(&self, _path: &str) -> Result<Option<Bytes>, StoreError> {
            std::future::pending().await
        }

        async fn write(&self, _path: &str, _bytes: Bytes) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn remove(&self, _path: &str) -> Result<bool, StoreError> {
            std::future::pending().await
        }

        async fn list(&self, _prefix: &str) -> Result<Vec<String>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn scoped_listing_strips_the_tenant_prefix() {
        let backend: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let scope = TenantScope::new("acme", "draft").expect("valid scope");
        let scoped = ScopedStore::new(Arc::clone(&backend), &scope);

        scoped
            .write("renditions/hero/k.json", Bytes::from("{}"))
            .await
            .expect("write");
        backend
            .write("acme/other/renditions/hero/k.json", Bytes::from("{}"))
            .await
            .expect("write");

        assert_eq!(
            scoped.list("renditions").await.expect("list"),
            vec!["renditions/hero/k.json".to_string()]
        );
        assert_eq!(scoped.list("").await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn scoped_store_rejects_escaping_paths() {
        let backend: Arc<dyn ContentStore> = Arc::new(MemoryContentStore::new());
        let scope = TenantScope::new("acme", "master").expect("valid scope");
        let scoped = ScopedStore::new(backend, &scope);

        let err = scoped
            .read("../../globex/master/secret")
            .await
            .expect_err("escape rejected");
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_store_reports_timeouts() {
        let timed = TimedStore::new(Arc::new(StalledStore), Duration::from_millis(50));

        let err = timed.read("fragments/x").await.expect_err("times out");
        assert!(matches!(
            err,
            StoreError::Timeout {
                op: "read",
                timeout_ms: 50,
                ..
            }
        ));
    }
}
