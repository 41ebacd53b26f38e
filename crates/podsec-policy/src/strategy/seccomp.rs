//! Seccomp profile strategy.
//!
//! Profiles travel as pod annotations: one pod-wide key and one key per
//! container. The container annotation overrides the pod annotation when
//! the container runs, but the two are validated independently.

use podsec_core::{
    seccomp_container_annotation_key, Container, FieldPath, Pod, ValidationError,
    ValidationErrorList, SECCOMP_POD_ANNOTATION_KEY,
};

use crate::error::PolicyResult;
use crate::strategy::security_context_path;
use crate::types::SeccompStrategyOptions;

/// Allow-list entry that legalizes every profile, including none.
pub const ALLOW_ANY_PROFILE: &str = "*";

fn annotations_path() -> FieldPath {
    FieldPath::new("metadata").child("annotations")
}

pub enum SeccompStrategy {
    MustRunAs { allowed_profiles: Vec<String> },
}

impl SeccompStrategy {
    pub fn from_options(options: &SeccompStrategyOptions) -> Self {
        SeccompStrategy::MustRunAs {
            allowed_profiles: options.allowed_profiles.clone(),
        }
    }

    fn allowed_profiles(&self) -> &[String] {
        match self {
            SeccompStrategy::MustRunAs { allowed_profiles } => allowed_profiles,
        }
    }

    fn is_allowed(&self, profile: &str) -> bool {
        self.allowed_profiles()
            .iter()
            .any(|p| p == profile || p == ALLOW_ANY_PROFILE)
    }

    /// First concrete entry of the allow-list. The wildcard is never handed out.
    pub fn generate(&self, _pod: &Pod, _container: &Container) -> PolicyResult<Option<String>> {
        Ok(self
            .allowed_profiles()
            .iter()
            .find(|p| p.as_str() != ALLOW_ANY_PROFILE)
            .cloned())
    }

    /// Checks the pod annotation, every container annotation and the
    /// profile on this container's security context. An unset pod or
    /// container annotation is only checked when the allow-list is
    /// non-empty; sibling containers are checked once they carry one.
    pub fn validate(&self, pod: &Pod, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();

        self.check(
            annotations_path().key(SECCOMP_POD_ANNOTATION_KEY),
            pod.annotations.get(SECCOMP_POD_ANNOTATION_KEY).map(String::as_str),
            &mut errs,
        );

        let container_key = seccomp_container_annotation_key(&container.name);
        self.check(
            annotations_path().key(&container_key),
            pod.annotations.get(&container_key).map(String::as_str),
            &mut errs,
        );

        for sibling in pod.spec.containers.iter().filter(|c| c.name != container.name) {
            let key = seccomp_container_annotation_key(&sibling.name);
            if let Some(profile) = pod.annotations.get(&key) {
                self.check(annotations_path().key(&key), Some(profile.as_str()), &mut errs);
            }
        }

        if let Some(profile) = container
            .security_context
            .as_ref()
            .and_then(|sc| sc.seccomp_profile.as_deref())
        {
            self.check(
                security_context_path().child("seccompProfile"),
                Some(profile),
                &mut errs,
            );
        }
        errs
    }

    fn check(&self, path: FieldPath, profile: Option<&str>, errs: &mut ValidationErrorList) {
        if profile.is_none() && self.allowed_profiles().is_empty() {
            return;
        }
        let profile = profile.unwrap_or_default();
        if !self.is_allowed(profile) {
            errs.push(ValidationError::not_supported(
                path,
                profile,
                self.allowed_profiles(),
            ));
        }
    }
}
