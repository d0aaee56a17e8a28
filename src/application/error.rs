use thiserror::Error;

use crate::cache::{CacheError, RenditionError};
use crate::domain::error::DomainError;
use crate::infra::{error::InfraError, store::StoreError};

use super::render::RenderError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Rendition(#[from] RenditionError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    /// Process exit code reported by the command-line binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Domain(_) | AppError::Validation(_) => 2,
            AppError::NotFound(_) => 3,
            AppError::Infra(InfraError::Store(_))
            | AppError::Rendition(RenditionError::Store(_))
            | AppError::Cache(_) => 4,
            AppError::Infra(_)
            | AppError::Render(_)
            | AppError::Rendition(_)
            | AppError::Unexpected(_) => 1,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        Self::Infra(InfraError::Store(error))
    }
}
