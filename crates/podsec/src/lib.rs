//! podsec root library
//!
//! Ties the policy engine to a configuration file and an in-memory cluster
//! state, and exposes the handful of operations the `podsec` binary runs:
//! admitting a pod, listing the candidate policies of a service account,
//! and checking the shape of every policy.

pub mod cluster;
pub mod config;
pub mod error;

pub use cluster::ClusterState;
pub use config::{AdmissionConfig, PluginKind, RootConfig};
pub use error::{RootError, RootResult};

use podsec_core::{IdentityStore, Operation, Pod, Principal, ValidationErrorList};
use podsec_policy::{
    select_candidates, validate_policy_set, AdmissionOptions, AdmissionPlugin, AlwaysAdmit,
    AuditSink, Collaborators, ConstraintAdmission, Decision, DenySecurityContext,
    NamespaceAnnotationBackend, PolicyStore,
};
use serde::{Deserialize, Serialize};

/// Decision of one admission run, with the pod as it leaves admission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionReport {
    pub plugin: String,
    pub decision: Decision,
    pub pod: Pod,
}

/// Instantiates the configured plugin over `state`.
pub fn build_plugin<'a>(
    kind: PluginKind,
    state: &'a ClusterState,
    allocations: &'a NamespaceAnnotationBackend<'a>,
    audit_sink: &'a dyn AuditSink,
    options: AdmissionOptions,
) -> Box<dyn AdmissionPlugin + 'a> {
    match kind {
        PluginKind::Constraint => Box::new(ConstraintAdmission::new(
            Collaborators {
                policies: state,
                identities: state,
                volumes: state,
                allocations,
            },
            audit_sink,
            options,
        )),
        PluginKind::Deny => Box::new(DenySecurityContext::new(options)),
        PluginKind::Admit => Box::new(AlwaysAdmit),
    }
}

/// Runs the configured plugin on `pod`. On admission the returned pod
/// carries the committed security contexts; on denial it is unchanged.
pub fn run_admission(
    state: &ClusterState,
    config: &AdmissionConfig,
    audit_sink: &dyn AuditSink,
    mut pod: Pod,
    namespace: &str,
    operation: Operation,
) -> RootResult<AdmissionReport> {
    let allocations = NamespaceAnnotationBackend::new(state);
    let plugin = build_plugin(
        config.plugin,
        state,
        &allocations,
        audit_sink,
        config.to_options(),
    );
    let decision = plugin.admit(&mut pod, namespace, operation)?;
    Ok(AdmissionReport {
        plugin: plugin.name().to_string(),
        decision,
        pod,
    })
}

/// Names of the policies a service account may use, in the order the
/// admission walk tries them.
pub fn candidates(
    state: &ClusterState,
    namespace: &str,
    service_account: &str,
) -> RootResult<Vec<String>> {
    let account = state.get_service_account(namespace, service_account)?;
    let principal = Principal::from_service_account(&account);
    let policies = state.list_policies()?;
    Ok(select_candidates(&policies, &principal)
        .into_iter()
        .map(|p| p.name.clone())
        .collect())
}

/// Validates every policy in `state`. Returns how many were checked.
pub fn check_policies(state: &ClusterState) -> Result<usize, ValidationErrorList> {
    validate_policy_set(&state.policies).map(|()| state.policies.len())
}
