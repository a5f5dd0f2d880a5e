use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl DomainError {
    /// True when the operation was rejected before anything was written.
    pub fn is_precondition_failure(&self) -> bool {
        !matches!(self, DomainError::Internal(_))
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
