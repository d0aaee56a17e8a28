use thiserror::Error;

use crate::infra::store::StoreError;

use super::marker::RenditionError;

/// Failure to populate the cache after a fragment was already delivered.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to write fragment artifact `{path}`")]
    Write {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to mark rendition of `{fragment}`")]
    Mark {
        fragment: String,
        #[source]
        source: RenditionError,
    },
    #[error("cache population task aborted: {0}")]
    Aborted(String),
}
