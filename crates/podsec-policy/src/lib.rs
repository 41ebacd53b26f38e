//! podsec policy engine
//!
//! Decides, for every container of a pod submitted for admission, which
//! security context it may run with: run-as uid, SELinux label, seccomp
//! profile, privilege, capabilities and host-path volumes.
//!
//! Key features:
//! - Closed per-dimension strategies chosen once per policy (`strategy`)
//! - Request-scoped, memoizing id allocator backed by namespace annotations
//! - Candidate policies filtered by ACL and tried in name order
//! - Generate-then-validate on a clone; the real pod changes only when every
//!   container matched
//! - Denials carry field-attributed errors and separate lookup trouble from
//!   security violations

pub mod admission;
pub mod allocator;
pub mod audit;
pub mod error;
pub mod matcher;
pub mod provider;
pub mod strategy;
pub mod types;
pub mod validation;

// Re-export primary types for convenience
pub use admission::{
    AdmissionPlugin, AlwaysAdmit, Collaborators, ConstraintAdmission, DenySecurityContext,
};
pub use allocator::{AllocationBackend, Allocator, NamespaceAnnotationBackend};
pub use audit::{AuditSink, InMemoryAuditSink, NoopAuditSink};
pub use error::{PolicyError, PolicyResult};
pub use matcher::{select_candidates, PolicyStore};
pub use provider::{apply_security_context, PolicyProvider};
pub use types::{
    AdmissionOptions, AdmitDecision, ContainerAssignment, Decision, DenyDecision, DenyReason,
    Policy, PolicyAcl, PolicyAuditEvent, PolicyAuditEventKind, RunAsUserStrategyOptions,
    RunAsUserStrategyType, SELinuxStrategyOptions, SELinuxStrategyType, SeccompStrategyOptions,
};
pub use validation::{validate_policy, validate_policy_set};
