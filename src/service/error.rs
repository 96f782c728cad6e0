//! Service layer errors.

use thiserror::Error;

use super::events::LifecycleEvent;
use crate::criteria::CriteriaError;

/// Errors raised by [`CrudService`](super::CrudService) and repositories.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request cannot be served as given (blank id, empty payload,
    /// missing criteria).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No entity matched.
    #[error("{entity} not found")]
    NotFound { entity: String },

    /// Entity validation failed.
    #[error("validation failed: {}", .0.join(" "))]
    Validation(Vec<String>),

    /// Criteria could not be compiled.
    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    /// The repository failed.
    #[error("repository error: {0}")]
    Repository(String),

    /// A lifecycle listener aborted the operation.
    #[error("{event} listener failed: {message}")]
    Listener {
        event: LifecycleEvent,
        message: String,
    },
}

impl ServiceError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ServiceError::InvalidRequest(message.into())
    }

    pub fn repository(message: impl Into<String>) -> Self {
        ServiceError::Repository(message.into())
    }

    pub fn listener(event: LifecycleEvent, message: impl Into<String>) -> Self {
        ServiceError::Listener {
            event,
            message: message.into(),
        }
    }
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
