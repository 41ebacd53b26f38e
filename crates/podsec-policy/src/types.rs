use podsec_core::{Operation, Principal, SELinuxOptions, Timestamp, ValidationErrorList};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::strategy::user::DEFAULT_NON_ROOT_UID;

// ---------------------------------------------------------------------------
// Strategy declarations
// ---------------------------------------------------------------------------

/// Declared RunAsUser strategy. Unknown names survive deserialization as
/// `Unrecognized` so the policy can be excluded instead of failing the load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunAsUserStrategyType {
    MustRunAs,
    MustRunAsRange,
    MustRunAsNonRoot,
    RunAsAny,
    Unrecognized(String),
}

impl From<String> for RunAsUserStrategyType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "MustRunAs" => RunAsUserStrategyType::MustRunAs,
            "MustRunAsRange" => RunAsUserStrategyType::MustRunAsRange,
            "MustRunAsNonRoot" => RunAsUserStrategyType::MustRunAsNonRoot,
            "RunAsAny" => RunAsUserStrategyType::RunAsAny,
            _ => RunAsUserStrategyType::Unrecognized(s),
        }
    }
}

impl From<RunAsUserStrategyType> for String {
    fn from(t: RunAsUserStrategyType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for RunAsUserStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunAsUserStrategyType::MustRunAs => write!(f, "MustRunAs"),
            RunAsUserStrategyType::MustRunAsRange => write!(f, "MustRunAsRange"),
            RunAsUserStrategyType::MustRunAsNonRoot => write!(f, "MustRunAsNonRoot"),
            RunAsUserStrategyType::RunAsAny => write!(f, "RunAsAny"),
            RunAsUserStrategyType::Unrecognized(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAsUserStrategyOptions {
    #[serde(rename = "type")]
    pub strategy: RunAsUserStrategyType,
    /// Fixed uid for `MustRunAs`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    /// Namespace annotation holding the pre-allocated uid for `MustRunAsRange`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_id_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SELinuxStrategyType {
    MustRunAs,
    RunAsAny,
    Unrecognized(String),
}

impl From<String> for SELinuxStrategyType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "MustRunAs" => SELinuxStrategyType::MustRunAs,
            "RunAsAny" => SELinuxStrategyType::RunAsAny,
            _ => SELinuxStrategyType::Unrecognized(s),
        }
    }
}

impl From<SELinuxStrategyType> for String {
    fn from(t: SELinuxStrategyType) -> Self {
        t.to_string()
    }
}

impl fmt::Display for SELinuxStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SELinuxStrategyType::MustRunAs => write!(f, "MustRunAs"),
            SELinuxStrategyType::RunAsAny => write!(f, "RunAsAny"),
            SELinuxStrategyType::Unrecognized(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SELinuxStrategyOptions {
    #[serde(rename = "type")]
    pub strategy: SELinuxStrategyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub se_linux_options: Option<SELinuxOptions>,
}

/// Seccomp allow-list. `"*"` legalizes any profile, including none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeccompStrategyOptions {
    #[serde(default)]
    pub allowed_profiles: Vec<String>,
}

// ---------------------------------------------------------------------------
// PolicyAcl — who may use a policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAcl {
    #[serde(default)]
    pub users: BTreeSet<String>,
    #[serde(default)]
    pub groups: BTreeSet<String>,
}

impl PolicyAcl {
    /// True when the principal's user, or any of its groups, is listed.
    pub fn admits(&self, principal: &Principal) -> bool {
        self.users.contains(&principal.user)
            || principal.groups.iter().any(|g| self.groups.contains(g))
    }
}

// ---------------------------------------------------------------------------
// Policy — a named, ACL-scoped bundle of strategies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub name: String,
    pub run_as_user: RunAsUserStrategyOptions,
    pub se_linux_context: SELinuxStrategyOptions,
    #[serde(default)]
    pub seccomp: SeccompStrategyOptions,
    #[serde(default)]
    pub allow_privileged_container: bool,
    #[serde(default)]
    pub allowed_capabilities: Vec<String>,
    #[serde(default)]
    pub allow_host_dir_volume_plugin: bool,
    #[serde(default)]
    pub acl: PolicyAcl,
}

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// Terminal admission outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Admit(AdmitDecision),
    Deny(DenyDecision),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit(_))
    }
}

/// Which policy was committed onto which container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerAssignment {
    pub container: String,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmitDecision {
    /// Empty when the request was admitted without evaluation.
    pub assignments: Vec<ContainerAssignment>,
    pub evaluated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DenyDecision {
    pub reason: DenyReason,
    /// Container whose candidates were exhausted, when the denial is per-container.
    pub container: Option<String>,
    pub errors: ValidationErrorList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DenyReason {
    /// The pod declares no service account.
    MissingServiceAccount,
    /// The service account could not be fetched.
    IdentityLookupFailed,
    /// The policy list could not be fetched.
    PolicyLookupFailed,
    /// The last candidate failed to generate because an id could not be allocated.
    AllocationFailed,
    /// The last candidate's validation could not reach a collaborator.
    ValidationLookupFailed,
    /// No policy's ACL admits the principal.
    NoMatchingPolicy,
    /// Every candidate policy is misconfigured.
    InvalidPolicy,
    /// Some container satisfied no candidate policy.
    PolicyViolation,
    /// A security context was supplied where none is permitted.
    SecurityContextForbidden,
}

impl DenyReason {
    /// True for denials caused by infrastructure trouble rather than a
    /// security violation.
    pub fn is_lookup_failure(self) -> bool {
        matches!(
            self,
            DenyReason::IdentityLookupFailed
                | DenyReason::PolicyLookupFailed
                | DenyReason::AllocationFailed
                | DenyReason::ValidationLookupFailed
        )
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::MissingServiceAccount => write!(f, "pod declares no service account"),
            DenyReason::IdentityLookupFailed => write!(f, "service account lookup failed"),
            DenyReason::PolicyLookupFailed => write!(f, "policy lookup failed"),
            DenyReason::AllocationFailed => write!(f, "id allocation failed"),
            DenyReason::ValidationLookupFailed => write!(f, "lookup failed during validation"),
            DenyReason::NoMatchingPolicy => write!(f, "no policy available to principal"),
            DenyReason::InvalidPolicy => write!(f, "all candidate policies are invalid"),
            DenyReason::PolicyViolation => write!(f, "unable to validate against any policy"),
            DenyReason::SecurityContextForbidden => write!(f, "security context is forbidden"),
        }
    }
}

// ---------------------------------------------------------------------------
// Audit types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyAuditEventKind {
    AdmissionEvaluated,
    CandidateRejected,
    PolicyExcluded,
    PolicyCommitted,
}

/// A structured audit event. `policy` carries the provider's policy name
/// for attribution only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyAuditEvent {
    pub event_kind: PolicyAuditEventKind,
    pub timestamp: Timestamp,
    pub namespace: String,
    pub pod: String,
    pub container: Option<String>,
    pub policy: Option<String>,
    pub summary: Option<String>,
}

// ---------------------------------------------------------------------------
// AdmissionOptions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionOptions {
    /// Operations evaluated; anything else is admitted untouched.
    pub operations: Vec<Operation>,
    /// Deny with every tried candidate's errors instead of only the last.
    pub report_all_candidate_errors: bool,
    /// Uid handed out by `MustRunAsNonRoot` when the caller gave none.
    pub non_root_fallback_uid: i64,
}

impl AdmissionOptions {
    pub fn handles(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

impl Default for AdmissionOptions {
    fn default() -> Self {
        Self {
            operations: vec![Operation::Create, Operation::Update],
            report_all_candidate_errors: false,
            non_root_fallback_uid: DEFAULT_NON_ROOT_UID,
        }
    }
}
