//! Error type shared by the generation use cases.

use vitrine_domain::DomainError;

use crate::infrastructure::ports::{ProviderError, RepoError, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// Bad input, never retried
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("File error: {0}")]
    File(#[from] StorageError),

    #[error("Image processing error: {0}")]
    Image(String),
}

impl GenerationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }

    pub fn image(message: impl ToString) -> Self {
        Self::Image(message.to_string())
    }
}

impl From<DomainError> for GenerationError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            DomainError::Validation(message) => Self::Validation(message),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<image::ImageError> for GenerationError {
    fn from(err: image::ImageError) -> Self {
        Self::Image(err.to_string())
    }
}
