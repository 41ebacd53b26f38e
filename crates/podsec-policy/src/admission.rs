use podsec_core::{
    ErrorType, FieldPath, IdentityStore, Operation, Pod, Principal, SecurityContext, Timestamp,
    ValidationError, ValidationErrorList, VolumeStore,
};

use crate::allocator::{AllocationBackend, Allocator};
use crate::audit::AuditSink;
use crate::error::{PolicyError, PolicyResult};
use crate::matcher::{select_candidates, PolicyStore};
use crate::provider::{apply_security_context, PolicyProvider};
use crate::strategy::security_context_path;
use crate::types::{
    AdmissionOptions, AdmitDecision, ContainerAssignment, Decision, DenyDecision, DenyReason,
    PolicyAuditEvent, PolicyAuditEventKind,
};

// ---------------------------------------------------------------------------
// AdmissionPlugin — the exposed entry point
// ---------------------------------------------------------------------------

/// An admission plugin decides whether a pod may be persisted, mutating it
/// in place when it is admitted. A denied pod is left untouched.
///
/// `Err` is reserved for failures of the plugin itself; a rejected pod is
/// `Ok(Decision::Deny(..))`.
pub trait AdmissionPlugin {
    fn name(&self) -> &'static str;

    fn admit(&self, pod: &mut Pod, namespace: &str, operation: Operation)
        -> PolicyResult<Decision>;
}

fn admit_unchanged() -> Decision {
    Decision::Admit(AdmitDecision {
        assignments: Vec::new(),
        evaluated_at: Timestamp::now(),
    })
}

fn containers_path() -> FieldPath {
    FieldPath::new("spec").child("containers")
}

/// Roots a container-relative error path at `spec.containers[index]`.
/// Pod-level paths such as `metadata.annotations[..]` are already absolute.
fn qualify_field(index: usize, field: &FieldPath) -> FieldPath {
    if field.as_str().starts_with("metadata") {
        return field.clone();
    }
    containers_path().index(index).child(field.as_str())
}

// ---------------------------------------------------------------------------
// ConstraintAdmission — per-container policy matching and commit
// ---------------------------------------------------------------------------

/// Cluster state the constraint plugin reads.
pub struct Collaborators<'a> {
    pub policies: &'a dyn PolicyStore,
    pub identities: &'a dyn IdentityStore,
    pub volumes: &'a dyn VolumeStore,
    pub allocations: &'a dyn AllocationBackend,
}

enum ContainerOutcome {
    Matched {
        policy: String,
        context: SecurityContext,
    },
    Exhausted {
        reason: DenyReason,
        errors: ValidationErrorList,
    },
}

/// Admits a pod only when every container satisfies some policy its
/// service account may use.
///
/// Containers are matched in order against a working copy of the pod. For
/// each one, candidates are tried in name order on a clone of that copy,
/// and the first whose generated context validates cleanly is applied to
/// it, so later containers are checked against the earlier results. The
/// real pod is replaced by the working copy only once every container has
/// matched.
pub struct ConstraintAdmission<'a> {
    stores: Collaborators<'a>,
    audit_sink: &'a dyn AuditSink,
    options: AdmissionOptions,
}

impl<'a> ConstraintAdmission<'a> {
    pub fn new(
        stores: Collaborators<'a>,
        audit_sink: &'a dyn AuditSink,
        options: AdmissionOptions,
    ) -> Self {
        Self {
            stores,
            audit_sink,
            options,
        }
    }

    fn resolve_principal(&self, pod: &Pod, namespace: &str) -> Result<Principal, DenyDecision> {
        let field = FieldPath::new("spec").child("serviceAccountName");
        let name = &pod.spec.service_account_name;
        if name.is_empty() {
            return Err(DenyDecision {
                reason: DenyReason::MissingServiceAccount,
                container: None,
                errors: ValidationError::required(field, "pod declares no service account").into(),
            });
        }

        match self.stores.identities.get_service_account(namespace, name) {
            Ok(account) => Ok(Principal::from_service_account(&account)),
            Err(e) => Err(DenyDecision {
                reason: DenyReason::IdentityLookupFailed,
                container: None,
                errors: ValidationError::internal(
                    field,
                    format!("unable to fetch service account {}/{}: {}", namespace, name, e),
                )
                .into(),
            }),
        }
    }

    /// Walks the providers for one container. Generation and validation run
    /// against a fresh clone of `working` per candidate. `working` already
    /// carries the contexts accepted for the containers before `index`.
    fn match_container(
        &self,
        working: &Pod,
        index: usize,
        providers: &[PolicyProvider<'_>],
    ) -> PolicyResult<ContainerOutcome> {
        let container = &working.spec.containers[index];
        let mut last = ContainerOutcome::Exhausted {
            reason: DenyReason::InvalidPolicy,
            errors: ValidationErrorList::new(),
        };
        let mut every_error = ValidationErrorList::new();

        for provider in providers {
            let (reason, errors) = match provider.create_security_context(working, container) {
                Ok(context) => {
                    let mut trial = working.clone();
                    apply_security_context(&mut trial, index, context.clone())?;
                    let errors =
                        provider.validate_security_context(&trial, &trial.spec.containers[index]);
                    if errors.is_empty() {
                        tracing::debug!(
                            pod = %working.name,
                            container = %container.name,
                            policy = %provider.policy_name(),
                            "candidate policy matched"
                        );
                        return Ok(ContainerOutcome::Matched {
                            policy: provider.policy_name().to_string(),
                            context,
                        });
                    }
                    let reason = if errors.has_type(ErrorType::InternalError) {
                        DenyReason::ValidationLookupFailed
                    } else {
                        DenyReason::PolicyViolation
                    };
                    (reason, errors)
                }
                Err(e) => {
                    let reason = match e {
                        PolicyError::Allocation { .. } => DenyReason::AllocationFailed,
                        _ => DenyReason::PolicyViolation,
                    };
                    let error = ValidationError::internal(
                        security_context_path().child("runAsUser"),
                        e.to_string(),
                    );
                    (reason, error.into())
                }
            };

            tracing::debug!(
                pod = %working.name,
                container = %container.name,
                policy = %provider.policy_name(),
                reason = %reason,
                errors = errors.len(),
                "candidate policy rejected"
            );
            self.emit(
                PolicyAuditEventKind::CandidateRejected,
                working,
                Some(&container.name),
                Some(provider.policy_name()),
                Some(format!("{}: {}", reason, errors)),
            )?;

            if self.options.report_all_candidate_errors {
                every_error.extend(errors.clone().attributed_to(provider.policy_name()));
            }
            last = ContainerOutcome::Exhausted { reason, errors };
        }

        if self.options.report_all_candidate_errors {
            if let ContainerOutcome::Exhausted { reason, .. } = last {
                return Ok(ContainerOutcome::Exhausted {
                    reason,
                    errors: every_error,
                });
            }
        }
        Ok(last)
    }

    fn deny(&self, pod: &Pod, decision: DenyDecision) -> PolicyResult<Decision> {
        tracing::info!(
            pod = %pod.name,
            namespace = %pod.namespace,
            reason = %decision.reason,
            container = decision.container.as_deref().unwrap_or(""),
            errors = %decision.errors,
            "pod denied"
        );
        self.emit(
            PolicyAuditEventKind::AdmissionEvaluated,
            pod,
            decision.container.as_deref(),
            None,
            Some(format!("DENY: {}", decision.reason)),
        )?;
        Ok(Decision::Deny(decision))
    }

    fn emit(
        &self,
        event_kind: PolicyAuditEventKind,
        pod: &Pod,
        container: Option<&str>,
        policy: Option<&str>,
        summary: Option<String>,
    ) -> PolicyResult<()> {
        let event = PolicyAuditEvent {
            event_kind,
            timestamp: Timestamp::now(),
            namespace: pod.namespace.clone(),
            pod: pod.name.clone(),
            container: container.map(str::to_string),
            policy: policy.map(str::to_string),
            summary,
        };
        self.audit_sink
            .emit(&event)
            .map_err(|e| {
                PolicyError::AuditSinkError(format!("failed to emit admission audit: {}", e))
            })
    }
}

impl AdmissionPlugin for ConstraintAdmission<'_> {
    fn name(&self) -> &'static str {
        "SecurityContextConstraint"
    }

    fn admit(
        &self,
        pod: &mut Pod,
        namespace: &str,
        operation: Operation,
    ) -> PolicyResult<Decision> {
        if !self.options.handles(operation) {
            tracing::debug!(pod = %pod.name, %operation, "operation not handled, admitting");
            return Ok(admit_unchanged());
        }
        if !pod.namespace.is_empty() && pod.namespace != namespace {
            return Err(PolicyError::InvalidRequest(format!(
                "pod {} is in namespace {} but the request targets {}",
                pod.name, pod.namespace, namespace
            )));
        }

        let mut base = pod.clone();
        base.namespace = namespace.to_string();

        let principal = match self.resolve_principal(&base, namespace) {
            Ok(principal) => principal,
            Err(denial) => return self.deny(&base, denial),
        };

        let policies = match self.stores.policies.list_policies() {
            Ok(policies) => policies,
            Err(e) => {
                return self.deny(
                    &base,
                    DenyDecision {
                        reason: DenyReason::PolicyLookupFailed,
                        container: None,
                        errors: ValidationError::internal(
                            FieldPath::new("policies"),
                            format!("unable to list policies: {}", e),
                        )
                        .into(),
                    },
                )
            }
        };

        let candidates = select_candidates(&policies, &principal);
        if candidates.is_empty() {
            return self.deny(
                &base,
                DenyDecision {
                    reason: DenyReason::NoMatchingPolicy,
                    container: None,
                    errors: ValidationError::forbidden(
                        FieldPath::new("spec").child("serviceAccountName"),
                        format!("no policy is available to {}", principal),
                    )
                    .into(),
                },
            );
        }

        let allocator = Allocator::new(self.stores.allocations);
        let mut providers = Vec::with_capacity(candidates.len());
        let mut excluded = ValidationErrorList::new();
        for policy in candidates {
            match PolicyProvider::new(policy, &allocator, self.stores.volumes, &self.options) {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    tracing::warn!(
                        policy = %policy.name,
                        error = %e,
                        "excluding misconfigured policy"
                    );
                    self.emit(
                        PolicyAuditEventKind::PolicyExcluded,
                        &base,
                        None,
                        Some(&policy.name),
                        Some(e.to_string()),
                    )?;
                    excluded.push(ValidationError::invalid(
                        FieldPath::new("policies"),
                        &policy.name,
                        e.to_string(),
                    ));
                }
            }
        }
        if providers.is_empty() {
            return self.deny(
                &base,
                DenyDecision {
                    reason: DenyReason::InvalidPolicy,
                    container: None,
                    errors: excluded,
                },
            );
        }

        let mut working = base.clone();
        let mut assignments = Vec::with_capacity(base.spec.containers.len());
        for index in 0..working.spec.containers.len() {
            match self.match_container(&working, index, &providers)? {
                ContainerOutcome::Matched { policy, context } => {
                    apply_security_context(&mut working, index, context)?;
                    assignments.push(ContainerAssignment {
                        container: working.spec.containers[index].name.clone(),
                        policy,
                    });
                }
                ContainerOutcome::Exhausted { reason, errors } => {
                    let container = base.spec.containers[index].name.clone();
                    return self.deny(
                        &base,
                        DenyDecision {
                            reason,
                            container: Some(container),
                            errors: errors
                                .into_iter()
                                .map(|mut e| {
                                    e.field = qualify_field(index, &e.field);
                                    e
                                })
                                .collect(),
                        },
                    );
                }
            }
        }

        for assignment in &assignments {
            self.emit(
                PolicyAuditEventKind::PolicyCommitted,
                &base,
                Some(&assignment.container),
                Some(&assignment.policy),
                None,
            )?;
        }
        working.namespace.clone_from(&pod.namespace);
        *pod = working;

        tracing::info!(
            pod = %base.name,
            namespace = %base.namespace,
            containers = assignments.len(),
            "pod admitted"
        );
        self.emit(
            PolicyAuditEventKind::AdmissionEvaluated,
            &base,
            None,
            None,
            Some("ADMIT".to_string()),
        )?;

        Ok(Decision::Admit(AdmitDecision {
            assignments,
            evaluated_at: Timestamp::now(),
        }))
    }
}

// ---------------------------------------------------------------------------
// DenySecurityContext — refuses any caller-supplied security context
// ---------------------------------------------------------------------------

/// Denies every pod in which a container declares a security context.
pub struct DenySecurityContext {
    options: AdmissionOptions,
}

impl DenySecurityContext {
    pub fn new(options: AdmissionOptions) -> Self {
        Self { options }
    }
}

impl AdmissionPlugin for DenySecurityContext {
    fn name(&self) -> &'static str {
        "SecurityContextDeny"
    }

    fn admit(
        &self,
        pod: &mut Pod,
        _namespace: &str,
        operation: Operation,
    ) -> PolicyResult<Decision> {
        if !self.options.handles(operation) {
            return Ok(admit_unchanged());
        }

        let errors: ValidationErrorList = pod
            .spec
            .containers
            .iter()
            .enumerate()
            .filter(|(_, c)| c.security_context.is_some())
            .map(|(i, c)| {
                ValidationError::forbidden(
                    containers_path().index(i).child("securityContext"),
                    format!("security context is forbidden on container {}", c.name),
                )
            })
            .collect();

        if errors.is_empty() {
            return Ok(admit_unchanged());
        }
        tracing::info!(pod = %pod.name, errors = %errors, "pod denied");
        Ok(Decision::Deny(DenyDecision {
            reason: DenyReason::SecurityContextForbidden,
            container: None,
            errors,
        }))
    }
}

/// Admits every pod unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAdmit;

impl AdmissionPlugin for AlwaysAdmit {
    fn name(&self) -> &'static str {
        "AlwaysAdmit"
    }

    fn admit(
        &self,
        _pod: &mut Pod,
        _namespace: &str,
        _operation: Operation,
    ) -> PolicyResult<Decision> {
        Ok(admit_unchanged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::types::{
        Policy, PolicyAcl, RunAsUserStrategyOptions, RunAsUserStrategyType,
        SELinuxStrategyOptions, SELinuxStrategyType, SeccompStrategyOptions,
    };
    use podsec_core::{
        Container, PodSpec, ServiceAccount, StoreError, StoreResult, Volume, VolumeMount,
        VolumeSource,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Policies(StoreResult<Vec<Policy>>);

    impl PolicyStore for Policies {
        fn list_policies(&self) -> StoreResult<Vec<Policy>> {
            self.0.clone()
        }
    }

    struct Identities {
        fail: bool,
    }

    impl IdentityStore for Identities {
        fn get_service_account(&self, namespace: &str, name: &str) -> StoreResult<ServiceAccount> {
            if self.fail {
                return Err(StoreError::Unavailable("connection refused".into()));
            }
            Ok(ServiceAccount {
                name: name.into(),
                namespace: namespace.into(),
                uid: "sa-1".into(),
                groups: vec![],
            })
        }
    }

    struct Volumes;

    impl VolumeStore for Volumes {
        fn get_volume(&self, name: &str) -> StoreResult<Volume> {
            match name {
                "host" => Ok(Volume {
                    name: name.into(),
                    source: VolumeSource::HostPath { path: "/etc".into() },
                }),
                _ => Err(StoreError::not_found("volume", name)),
            }
        }
    }

    /// Counts backend calls so tests can see the allocator's memoization.
    struct Counting {
        calls: AtomicUsize,
        result: PolicyResult<i64>,
    }

    impl Counting {
        fn ok(uid: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Ok(uid),
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result: Err(PolicyError::Allocation {
                    namespace: "team-a".into(),
                    key: "podsec.io/uid".into(),
                    reason: "annotation not set on namespace".into(),
                }),
            }
        }
    }

    impl AllocationBackend for Counting {
        fn allocated_id(&self, _namespace: &str, _key: &str) -> PolicyResult<i64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    const GROUP: &str = "system:serviceaccounts:team-a";

    fn any_policy(name: &str) -> Policy {
        Policy {
            name: name.into(),
            run_as_user: RunAsUserStrategyOptions {
                strategy: RunAsUserStrategyType::RunAsAny,
                uid: None,
                allocated_id_annotation: None,
            },
            se_linux_context: SELinuxStrategyOptions {
                strategy: SELinuxStrategyType::RunAsAny,
                se_linux_options: None,
            },
            seccomp: SeccompStrategyOptions::default(),
            allow_privileged_container: true,
            allowed_capabilities: vec![],
            allow_host_dir_volume_plugin: true,
            acl: PolicyAcl {
                users: Default::default(),
                groups: [GROUP.to_string()].into_iter().collect(),
            },
        }
    }

    fn range_policy(name: &str) -> Policy {
        Policy {
            run_as_user: RunAsUserStrategyOptions {
                strategy: RunAsUserStrategyType::MustRunAsRange,
                uid: None,
                allocated_id_annotation: Some("podsec.io/uid".into()),
            },
            allow_privileged_container: false,
            allow_host_dir_volume_plugin: false,
            ..any_policy(name)
        }
    }

    fn fixed_policy(name: &str, uid: i64) -> Policy {
        Policy {
            run_as_user: RunAsUserStrategyOptions {
                strategy: RunAsUserStrategyType::MustRunAs,
                uid: Some(uid),
                allocated_id_annotation: None,
            },
            allow_privileged_container: false,
            ..any_policy(name)
        }
    }

    fn pod(containers: Vec<Container>) -> Pod {
        Pod {
            name: "web".into(),
            namespace: "team-a".into(),
            spec: PodSpec {
                service_account_name: "builder".into(),
                containers,
            },
            ..Default::default()
        }
    }

    fn container(name: &str, ctx: Option<SecurityContext>) -> Container {
        Container {
            name: name.into(),
            image: "nginx".into(),
            security_context: ctx,
            volume_mounts: vec![],
        }
    }

    struct Harness {
        policies: Policies,
        identities: Identities,
        backend: Counting,
        sink: InMemoryAuditSink,
    }

    impl Harness {
        fn new(policies: Vec<Policy>) -> Self {
            Self {
                policies: Policies(Ok(policies)),
                identities: Identities { fail: false },
                backend: Counting::ok(1000020000),
                sink: InMemoryAuditSink::new(),
            }
        }

        fn plugin(&self, options: AdmissionOptions) -> ConstraintAdmission<'_> {
            ConstraintAdmission::new(
                Collaborators {
                    policies: &self.policies,
                    identities: &self.identities,
                    volumes: &Volumes,
                    allocations: &self.backend,
                },
                &self.sink,
                options,
            )
        }

        fn kinds(&self) -> Vec<PolicyAuditEventKind> {
            self.sink.events().into_iter().map(|e| e.event_kind).collect()
        }
    }

    fn deny_of(decision: Decision) -> DenyDecision {
        match decision {
            Decision::Deny(d) => d,
            other => panic!("expected deny, got {:?}", other),
        }
    }

    fn admit_of(decision: Decision) -> AdmitDecision {
        match decision {
            Decision::Admit(a) => a,
            other => panic!("expected admit, got {:?}", other),
        }
    }

    #[test]
    fn test_first_candidate_by_name_wins() {
        let h = Harness::new(vec![range_policy("restricted"), any_policy("anyuid")]);
        let mut p = pod(vec![container("app", None)]);
        let decision = h
            .plugin(AdmissionOptions::default())
            .admit(&mut p, "team-a", Operation::Create)
            .unwrap();
        let admitted = admit_of(decision);
        assert_eq!(admitted.assignments[0].policy, "anyuid");
        assert_eq!(
            p.spec.containers[0].security_context,
            Some(SecurityContext {
                privileged: Some(false),
                ..Default::default()
            })
        );
    }

    #[test]
    fn test_falls_through_to_later_candidate() {
        let h = Harness::new(vec![fixed_policy("a-fixed", 5000), range_policy("b-range")]);
        let ctx = SecurityContext {
            run_as_user: Some(1000020000),
            ..Default::default()
        };
        let mut p = pod(vec![container("app", Some(ctx))]);
        let admitted = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(admitted.assignments[0].policy, "b-range");
        assert_eq!(
            h.kinds(),
            vec![
                PolicyAuditEventKind::CandidateRejected,
                PolicyAuditEventKind::PolicyCommitted,
                PolicyAuditEventKind::AdmissionEvaluated,
            ]
        );
    }

    #[test]
    fn test_containers_matched_independently() {
        let h = Harness::new(vec![fixed_policy("a-fixed", 5000), range_policy("b-range")]);
        let mut p = pod(vec![
            container("app", None),
            container(
                "sidecar",
                Some(SecurityContext {
                    run_as_user: Some(1000020000),
                    ..Default::default()
                }),
            ),
        ]);
        let admitted = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        let policies: Vec<&str> = admitted.assignments.iter().map(|a| a.policy.as_str()).collect();
        assert_eq!(policies, vec!["a-fixed", "b-range"]);
        assert_eq!(
            p.spec.containers[0].security_context.as_ref().unwrap().run_as_user,
            Some(5000)
        );
    }

    fn seccomp_policy(name: &str, profiles: &[&str], privileged: bool) -> Policy {
        Policy {
            seccomp: SeccompStrategyOptions {
                allowed_profiles: profiles.iter().map(|p| p.to_string()).collect(),
            },
            allow_privileged_container: privileged,
            ..any_policy(name)
        }
    }

    fn privileged_container(name: &str) -> Container {
        container(
            name,
            Some(SecurityContext {
                privileged: Some(true),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn test_mixed_policies_commit_what_was_validated() {
        let h = Harness::new(vec![
            seccomp_policy("a", &["foo"], false),
            seccomp_policy("b", &["foo", "bar"], true),
        ]);
        let mut p = pod(vec![container("c0", None), privileged_container("c1")]);
        let first = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        let policies: Vec<&str> = first.assignments.iter().map(|a| a.policy.as_str()).collect();
        assert_eq!(policies, vec!["a", "b"]);
        for key in [
            "seccomp.security.alpha.kubernetes.io/pod",
            "container.seccomp.security.alpha.kubernetes.io/c0",
            "container.seccomp.security.alpha.kubernetes.io/c1",
        ] {
            assert_eq!(p.annotations.get(key).map(String::as_str), Some("foo"));
        }

        let admitted = p.clone();
        let second = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Update)
                .unwrap(),
        );
        assert_eq!(second.assignments, first.assignments);
        assert_eq!(p, admitted);
    }

    #[test]
    fn test_incompatible_profiles_denied_up_front() {
        let h = Harness::new(vec![
            seccomp_policy("a", &["foo"], false),
            seccomp_policy("b", &["bar"], true),
        ]);
        let mut p = pod(vec![container("c0", None), privileged_container("c1")]);
        let original = p.clone();
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::PolicyViolation);
        assert_eq!(denied.container.as_deref(), Some("c1"));
        assert_eq!(p, original);

        let fields: Vec<&str> = denied.errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"metadata.annotations[seccomp.security.alpha.kubernetes.io/pod]"));
        assert!(fields.contains(
            &"metadata.annotations[container.seccomp.security.alpha.kubernetes.io/c0]"
        ));
        assert!(fields.contains(&"spec.containers[1].securityContext.seccompProfile"));
        assert!(fields.iter().all(|f| !f.starts_with("spec.containers[1].metadata")));
    }

    #[test]
    fn test_denied_request_commits_nothing() {
        let h = Harness::new(vec![fixed_policy("fixed", 5000)]);
        let mut p = pod(vec![
            container("app", None),
            container(
                "sidecar",
                Some(SecurityContext {
                    run_as_user: Some(0),
                    ..Default::default()
                }),
            ),
        ]);
        let original = p.clone();
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::PolicyViolation);
        assert_eq!(denied.container.as_deref(), Some("sidecar"));
        assert_eq!(
            denied.errors.iter().next().unwrap().field.as_str(),
            "spec.containers[1].securityContext.runAsUser"
        );
        assert_eq!(p, original);
    }

    #[test]
    fn test_last_candidate_errors_reported() {
        let h = Harness::new(vec![fixed_policy("a", 5000), fixed_policy("b", 6000)]);
        let ctx = SecurityContext {
            run_as_user: Some(7000),
            ..Default::default()
        };
        let mut p = pod(vec![container("app", Some(ctx))]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.errors.len(), 1);
        assert!(denied.errors.iter().next().unwrap().detail.contains("6000"));
    }

    #[test]
    fn test_report_all_candidate_errors() {
        let h = Harness::new(vec![fixed_policy("a", 5000), fixed_policy("b", 6000)]);
        let ctx = SecurityContext {
            run_as_user: Some(7000),
            ..Default::default()
        };
        let mut p = pod(vec![container("app", Some(ctx))]);
        let options = AdmissionOptions {
            report_all_candidate_errors: true,
            ..Default::default()
        };
        let denied = deny_of(h.plugin(options).admit(&mut p, "team-a", Operation::Create).unwrap());
        let details: Vec<&str> = denied.errors.iter().map(|e| e.detail.as_str()).collect();
        assert_eq!(details.len(), 2);
        assert!(details[0].starts_with("policy \"a\""));
        assert!(details[1].starts_with("policy \"b\""));
    }

    #[test]
    fn test_missing_service_account() {
        let h = Harness::new(vec![any_policy("anyuid")]);
        let mut p = pod(vec![container("app", None)]);
        p.spec.service_account_name.clear();
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::MissingServiceAccount);
        assert!(denied.errors.has_type(ErrorType::Required));
    }

    #[test]
    fn test_identity_lookup_failure_is_distinct() {
        let mut h = Harness::new(vec![any_policy("anyuid")]);
        h.identities.fail = true;
        let mut p = pod(vec![container("app", None)]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::IdentityLookupFailed);
        assert!(denied.reason.is_lookup_failure());
    }

    #[test]
    fn test_policy_lookup_failure() {
        let mut h = Harness::new(vec![]);
        h.policies = Policies(Err(StoreError::Unavailable("etcd down".into())));
        let mut p = pod(vec![container("app", None)]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::PolicyLookupFailed);
    }

    #[test]
    fn test_no_matching_policy() {
        let mut stranger = any_policy("anyuid");
        stranger.acl.groups = ["system:serviceaccounts:team-b".to_string()]
            .into_iter()
            .collect();
        let h = Harness::new(vec![stranger]);
        let mut p = pod(vec![container("app", None)]);
        let original = p.clone();
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::NoMatchingPolicy);
        assert_eq!(p, original);
    }

    #[test]
    fn test_misconfigured_policy_excluded() {
        let mut broken = any_policy("a-broken");
        broken.run_as_user.strategy = RunAsUserStrategyType::Unrecognized("RunAsDefault".into());
        let h = Harness::new(vec![broken, any_policy("b-anyuid")]);
        let mut p = pod(vec![container("app", None)]);
        let admitted = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(admitted.assignments[0].policy, "b-anyuid");
        assert_eq!(h.kinds()[0], PolicyAuditEventKind::PolicyExcluded);
    }

    #[test]
    fn test_only_misconfigured_policies_deny() {
        let mut broken = any_policy("broken");
        broken.run_as_user.strategy = RunAsUserStrategyType::MustRunAs;
        let h = Harness::new(vec![broken]);
        let mut p = pod(vec![container("app", None)]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::InvalidPolicy);
        assert_eq!(denied.errors.len(), 1);
    }

    #[test]
    fn test_allocation_failure_moves_on() {
        let mut h = Harness::new(vec![range_policy("a-range"), any_policy("b-anyuid")]);
        h.backend = Counting::failing();
        let mut p = pod(vec![container("app", None)]);
        let admitted = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(admitted.assignments[0].policy, "b-anyuid");
    }

    #[test]
    fn test_allocation_failure_on_last_candidate() {
        let mut h = Harness::new(vec![range_policy("range")]);
        h.backend = Counting::failing();
        let mut p = pod(vec![container("app", None)]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::AllocationFailed);
        assert!(denied.errors.has_type(ErrorType::InternalError));
    }

    #[test]
    fn test_allocator_consulted_once_per_request() {
        let h = Harness::new(vec![range_policy("range")]);
        let mut p = pod(vec![container("app", None), container("sidecar", None)]);
        let plugin = h.plugin(AdmissionOptions::default());
        assert!(plugin.admit(&mut p, "team-a", Operation::Create).unwrap().is_admitted());
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);

        let mut again = pod(vec![container("app", None)]);
        assert!(plugin.admit(&mut again, "team-a", Operation::Create).unwrap().is_admitted());
        assert_eq!(h.backend.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_volume_lookup_failure_reason() {
        let h = Harness::new(vec![range_policy("range")]);
        let mut c = container("app", None);
        c.volume_mounts = vec![VolumeMount {
            name: "missing".into(),
            mount_path: "/data".into(),
        }];
        let mut p = pod(vec![c]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::ValidationLookupFailed);
    }

    #[test]
    fn test_host_path_rejected_when_disallowed() {
        let h = Harness::new(vec![range_policy("range")]);
        let mut c = container("app", None);
        c.volume_mounts = vec![VolumeMount {
            name: "host".into(),
            mount_path: "/host".into(),
        }];
        let mut p = pod(vec![c]);
        let denied = deny_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Create)
                .unwrap(),
        );
        assert_eq!(denied.reason, DenyReason::PolicyViolation);
        assert_eq!(
            denied.errors.iter().next().unwrap().field.as_str(),
            "spec.containers[0].volumeMounts[0]"
        );
    }

    #[test]
    fn test_unhandled_operation_admitted_untouched() {
        let h = Harness::new(vec![]);
        let mut p = pod(vec![container("app", None)]);
        let original = p.clone();
        let admitted = admit_of(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-a", Operation::Delete)
                .unwrap(),
        );
        assert!(admitted.assignments.is_empty());
        assert_eq!(p, original);
        assert!(h.sink.events().is_empty());
    }

    #[test]
    fn test_namespace_mismatch_is_error() {
        let h = Harness::new(vec![any_policy("anyuid")]);
        let mut p = pod(vec![container("app", None)]);
        assert!(matches!(
            h.plugin(AdmissionOptions::default())
                .admit(&mut p, "team-b", Operation::Create),
            Err(PolicyError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_deny_plugin() {
        let plugin = DenySecurityContext::new(AdmissionOptions::default());
        let mut clean = pod(vec![container("app", None)]);
        assert!(plugin.admit(&mut clean, "team-a", Operation::Create).unwrap().is_admitted());

        let mut p = pod(vec![
            container("app", Some(SecurityContext::default())),
            container("sidecar", None),
            container("debug", Some(SecurityContext::default())),
        ]);
        let denied = deny_of(plugin.admit(&mut p, "team-a", Operation::Create).unwrap());
        assert_eq!(denied.reason, DenyReason::SecurityContextForbidden);
        let fields: Vec<&str> = denied.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "spec.containers[0].securityContext",
                "spec.containers[2].securityContext"
            ]
        );
    }

    #[test]
    fn test_always_admit() {
        let mut p = pod(vec![container("app", Some(SecurityContext::default()))]);
        let original = p.clone();
        assert!(AlwaysAdmit.admit(&mut p, "team-a", Operation::Create).unwrap().is_admitted());
        assert_eq!(p, original);
    }
}
