use crate::error::StoreResult;
use crate::types::{Namespace, ServiceAccount, Volume};

// ---------------------------------------------------------------------------
// Collaborator stores
//
// These are the engine's only window onto cluster state. Calls are treated
// as blocking I/O; errors propagate unchanged and are never retried here.
// ---------------------------------------------------------------------------

pub trait IdentityStore: Send + Sync {
    fn get_service_account(&self, namespace: &str, name: &str) -> StoreResult<ServiceAccount>;
}

pub trait VolumeStore: Send + Sync {
    fn get_volume(&self, name: &str) -> StoreResult<Volume>;
}

pub trait NamespaceStore: Send + Sync {
    fn get_namespace(&self, name: &str) -> StoreResult<Namespace>;
}
