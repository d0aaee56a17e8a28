use bytes::Bytes;
use thiserror::Error;

use crate::cache::CacheError;
use crate::domain::error::DomainError;
use crate::domain::fragments::CacheKey;
use crate::infra::store::StoreError;

use super::chunk::ChunkError;
use super::evaluator::EvalError;

/// Errors that abort a fragment directive.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Expression(#[from] EvalError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("fragment body failed: {0}")]
    Body(String),
}

impl RenderError {
    pub fn body(message: impl Into<String>) -> Self {
        Self::Body(message.into())
    }
}

/// Result of reading a fragment artifact from the store.
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Bytes),
    Miss,
    Error(StoreError),
}

/// Result of the cache read path.
#[derive(Debug)]
pub enum ServeOutcome {
    /// The directive has no identity; nothing was looked up.
    Bypass,
    /// Stored output was streamed to the boundary.
    Served { key: CacheKey, bytes: usize },
    /// Nothing usable was stored; the caller should render now.
    Missed {
        key: CacheKey,
        error: Option<StoreError>,
    },
}

/// Result of the render-and-populate path.
#[derive(Debug)]
pub enum RenderOutcome {
    /// Rendered without an identity, so nothing was stored.
    Uncached,
    /// Output delivered, artifact written and rendition marked.
    Populated { key: CacheKey },
    /// Output delivered but the cache could not be populated.
    PopulationFailed { key: CacheKey, error: CacheError },
}

/// Result of the full directive pipeline.
#[derive(Debug)]
pub enum DirectiveOutcome {
    Served { key: CacheKey },
    Rendered(RenderOutcome),
}

impl DirectiveOutcome {
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            DirectiveOutcome::Served { key }
            | DirectiveOutcome::Rendered(RenderOutcome::Populated { key })
            | DirectiveOutcome::Rendered(RenderOutcome::PopulationFailed { key, .. }) => Some(key),
            DirectiveOutcome::Rendered(RenderOutcome::Uncached) => None,
        }
    }
}
