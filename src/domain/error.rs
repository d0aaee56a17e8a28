use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("requirement `{name}` is declared more than once")]
    DuplicateRequirement { name: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn duplicate_requirement(name: impl Into<String>) -> Self {
        Self::DuplicateRequirement { name: name.into() }
    }
}
