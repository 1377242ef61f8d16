use thiserror::Error;

use crate::store::StoreError;

/// Business-rule error taxonomy shared by the lifecycle manager and the
/// signaling registry. The request layer maps these to status codes; the
/// signaling layer maps them to `error` frames.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(StoreError),
}

impl CallError {
    /// Stable machine-readable code used in signaling `error` frames.
    pub fn code(&self) -> &'static str {
        match self {
            CallError::NotFound(_) => "not_found",
            CallError::Forbidden(_) => "forbidden",
            CallError::Conflict(_) => "conflict",
            CallError::Validation(_) => "validation",
            CallError::Store(_) => "internal",
        }
    }
}

impl From<StoreError> for CallError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CallError::NotFound("record"),
            StoreError::Duplicate(msg) => CallError::Conflict(msg),
            other => CallError::Store(other),
        }
    }
}
