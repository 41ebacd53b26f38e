use thiserror::Error;

/// Failure reported by a collaborator store.
///
/// The engine never retries on these; retry, if any, belongs to the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: &'static str, name: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
