use podsec_core::StoreError;
use thiserror::Error;

/// Single error enum for all policy engine operations.
///
/// Admission denials are not errors: they come back as `Decision::Deny`.
/// A `PolicyError` either stays inside the engine (a configuration or
/// allocation failure demotes one candidate) or signals that the engine
/// itself could not finish (audit sink failure, malformed request).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A policy declares an unrecognized or incomplete strategy.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("unable to allocate id from {namespace}/{key}: {reason}")]
    Allocation {
        namespace: String,
        key: String,
        reason: String,
    },

    #[error("lookup error: {0}")]
    Lookup(#[from] StoreError),

    #[error("audit sink error: {0}")]
    AuditSinkError(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;
