//! RunAsUser strategies.

use podsec_core::{Container, FieldPath, Pod, ValidationError, ValidationErrorList};

use crate::allocator::Allocator;
use crate::error::{PolicyError, PolicyResult};
use crate::strategy::security_context_path;
use crate::types::{RunAsUserStrategyOptions, RunAsUserStrategyType};

/// Uid handed out by `MustRunAsNonRoot` when nothing better is known.
pub const DEFAULT_NON_ROOT_UID: i64 = 1;

fn run_as_user_path() -> FieldPath {
    security_context_path().child("runAsUser")
}

fn requested_uid(container: &Container) -> Option<i64> {
    container
        .security_context
        .as_ref()
        .and_then(|sc| sc.run_as_user)
}

/// Shared prologue of the validating strategies: a uid must be present.
fn require_uid(container: &Container, errs: &mut ValidationErrorList) -> Option<i64> {
    match &container.security_context {
        None => {
            errs.push(ValidationError::required(
                security_context_path(),
                format!(
                    "unable to validate nil security context for container {}",
                    container.name
                ),
            ));
            None
        }
        Some(sc) => match sc.run_as_user {
            None => {
                errs.push(ValidationError::required(
                    run_as_user_path(),
                    format!("unable to validate nil runAsUser for container {}", container.name),
                ));
                None
            }
            Some(uid) => Some(uid),
        },
    }
}

/// Requires the container to run as one fixed uid.
#[derive(Debug, Clone)]
pub struct MustRunAs {
    uid: i64,
}

impl MustRunAs {
    pub fn new(uid: i64) -> Self {
        Self { uid }
    }

    pub fn generate(&self, _pod: &Pod, _container: &Container) -> PolicyResult<Option<i64>> {
        Ok(Some(self.uid))
    }

    pub fn validate(&self, _pod: &Pod, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        if let Some(uid) = require_uid(container, &mut errs) {
            if uid != self.uid {
                errs.push(ValidationError::invalid(
                    run_as_user_path(),
                    uid,
                    format!("uid on container {} must be {}", container.name, self.uid),
                ));
            }
        }
        errs
    }
}

/// Requires the uid pre-allocated to the pod's namespace under `key`.
pub struct MustRunAsRange<'a> {
    key: String,
    allocator: &'a Allocator<'a>,
}

impl<'a> MustRunAsRange<'a> {
    pub fn new(key: impl Into<String>, allocator: &'a Allocator<'a>) -> Self {
        Self {
            key: key.into(),
            allocator,
        }
    }

    pub fn generate(&self, pod: &Pod, _container: &Container) -> PolicyResult<Option<i64>> {
        self.allocator.get(&pod.namespace, &self.key).map(Some)
    }

    pub fn validate(&self, pod: &Pod, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        let Some(uid) = require_uid(container, &mut errs) else {
            return errs;
        };
        match self.allocator.get(&pod.namespace, &self.key) {
            Ok(allocated) if allocated == uid => {}
            Ok(allocated) => errs.push(ValidationError::invalid(
                run_as_user_path(),
                uid,
                format!(
                    "uid on container {} must be {}, allocated to namespace {}",
                    container.name, allocated, pod.namespace
                ),
            )),
            Err(e) => errs.push(ValidationError::internal(run_as_user_path(), e.to_string())),
        }
        errs
    }
}

/// Requires any uid other than root.
#[derive(Debug, Clone)]
pub struct MustRunAsNonRoot {
    fallback_uid: i64,
}

impl MustRunAsNonRoot {
    pub fn new(fallback_uid: i64) -> Self {
        Self { fallback_uid }
    }

    pub fn generate(&self, _pod: &Pod, container: &Container) -> PolicyResult<Option<i64>> {
        match requested_uid(container) {
            Some(uid) if uid > 0 => Ok(Some(uid)),
            _ => Ok(Some(self.fallback_uid)),
        }
    }

    pub fn validate(&self, _pod: &Pod, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        if let Some(uid) = require_uid(container, &mut errs) {
            if uid <= 0 {
                errs.push(ValidationError::invalid(
                    run_as_user_path(),
                    uid,
                    format!("container {} must run as a non-root uid", container.name),
                ));
            }
        }
        errs
    }
}

/// Accepts whatever the caller asked for, including nothing.
#[derive(Debug, Clone, Default)]
pub struct RunAsAny;

impl RunAsAny {
    pub fn generate(&self, _pod: &Pod, container: &Container) -> PolicyResult<Option<i64>> {
        Ok(requested_uid(container))
    }

    pub fn validate(&self, _pod: &Pod, _container: &Container) -> ValidationErrorList {
        ValidationErrorList::new()
    }
}

// ---------------------------------------------------------------------------
// RunAsUserStrategy — closed set of variants, chosen once per policy
// ---------------------------------------------------------------------------

pub enum RunAsUserStrategy<'a> {
    MustRunAs(MustRunAs),
    MustRunAsRange(MustRunAsRange<'a>),
    MustRunAsNonRoot(MustRunAsNonRoot),
    RunAsAny(RunAsAny),
}

impl<'a> RunAsUserStrategy<'a> {
    /// Instantiates the strategy a policy declares. Unknown types and
    /// missing parameters are configuration errors.
    pub fn from_options(
        options: &RunAsUserStrategyOptions,
        allocator: &'a Allocator<'a>,
        fallback_uid: i64,
    ) -> PolicyResult<Self> {
        match &options.strategy {
            RunAsUserStrategyType::MustRunAs => options
                .uid
                .map(|uid| RunAsUserStrategy::MustRunAs(MustRunAs::new(uid)))
                .ok_or_else(|| {
                    PolicyError::Configuration("MustRunAs requires a uid".to_string())
                }),
            RunAsUserStrategyType::MustRunAsRange => options
                .allocated_id_annotation
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(|key| RunAsUserStrategy::MustRunAsRange(MustRunAsRange::new(key, allocator)))
                .ok_or_else(|| {
                    PolicyError::Configuration(
                        "MustRunAsRange requires an allocated id annotation".to_string(),
                    )
                }),
            RunAsUserStrategyType::MustRunAsNonRoot => Ok(RunAsUserStrategy::MustRunAsNonRoot(
                MustRunAsNonRoot::new(fallback_uid),
            )),
            RunAsUserStrategyType::RunAsAny => Ok(RunAsUserStrategy::RunAsAny(RunAsAny)),
            RunAsUserStrategyType::Unrecognized(name) => Err(PolicyError::Configuration(format!(
                "unrecognized RunAsUser strategy type {}",
                name
            ))),
        }
    }

    pub fn generate(&self, pod: &Pod, container: &Container) -> PolicyResult<Option<i64>> {
        match self {
            RunAsUserStrategy::MustRunAs(s) => s.generate(pod, container),
            RunAsUserStrategy::MustRunAsRange(s) => s.generate(pod, container),
            RunAsUserStrategy::MustRunAsNonRoot(s) => s.generate(pod, container),
            RunAsUserStrategy::RunAsAny(s) => s.generate(pod, container),
        }
    }

    pub fn validate(&self, pod: &Pod, container: &Container) -> ValidationErrorList {
        match self {
            RunAsUserStrategy::MustRunAs(s) => s.validate(pod, container),
            RunAsUserStrategy::MustRunAsRange(s) => s.validate(pod, container),
            RunAsUserStrategy::MustRunAsNonRoot(s) => s.validate(pod, container),
            RunAsUserStrategy::RunAsAny(s) => s.validate(pod, container),
        }
    }
}
