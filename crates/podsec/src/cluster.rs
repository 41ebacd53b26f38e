//! In-memory cluster state.
//!
//! Holds the policies, service accounts, namespaces and volumes the
//! admission plugins read, loaded from a single JSON document. It backs
//! every collaborator trait, so the CLI and the integration tests run the
//! engine without a cluster.

use podsec_core::{
    IdentityStore, Namespace, NamespaceStore, ServiceAccount, StoreError, StoreResult, Volume,
    VolumeStore,
};
use podsec_policy::{Policy, PolicyStore};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::RootResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterState {
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(default)]
    pub service_accounts: Vec<ServiceAccount>,
    #[serde(default)]
    pub namespaces: Vec<Namespace>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

impl ClusterState {
    pub fn from_json(data: &str) -> RootResult<Self> {
        Ok(serde_json::from_str(data)?)
    }

    pub fn load(path: &Path) -> RootResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let state = Self::from_json(&contents)?;
        tracing::debug!(
            path = %path.display(),
            policies = state.policies.len(),
            service_accounts = state.service_accounts.len(),
            namespaces = state.namespaces.len(),
            volumes = state.volumes.len(),
            "loaded cluster state"
        );
        Ok(state)
    }
}

impl PolicyStore for ClusterState {
    fn list_policies(&self) -> StoreResult<Vec<Policy>> {
        Ok(self.policies.clone())
    }
}

impl IdentityStore for ClusterState {
    fn get_service_account(&self, namespace: &str, name: &str) -> StoreResult<ServiceAccount> {
        self.service_accounts
            .iter()
            .find(|sa| sa.namespace == namespace && sa.name == name)
            .cloned()
            .ok_or_else(|| {
                StoreError::not_found("serviceaccount", format!("{}/{}", namespace, name))
            })
    }
}

impl NamespaceStore for ClusterState {
    fn get_namespace(&self, name: &str) -> StoreResult<Namespace> {
        self.namespaces
            .iter()
            .find(|ns| ns.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("namespace", name))
    }
}

impl VolumeStore for ClusterState {
    fn get_volume(&self, name: &str) -> StoreResult<Volume> {
        self.volumes
            .iter()
            .find(|v| v.name == name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("volume", name))
    }
}
