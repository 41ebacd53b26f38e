use podsec_core::{FieldPath, ValidationError, ValidationErrorList};
use std::collections::HashSet;

use crate::types::{Policy, RunAsUserStrategyType, SELinuxStrategyType};

/// Validates the shape of a single policy.
///
/// Errors are accumulated; a policy that fails here cannot be turned into
/// a provider and is excluded from admission.
pub fn validate_policy(policy: &Policy) -> Result<(), ValidationErrorList> {
    let mut errors = ValidationErrorList::new();

    if policy.name.trim().is_empty() {
        errors.push(ValidationError::required(
            FieldPath::new("name"),
            "policy name must not be empty",
        ));
    }

    let run_as_user = FieldPath::new("runAsUser");
    match &policy.run_as_user.strategy {
        RunAsUserStrategyType::MustRunAs => {
            if policy.run_as_user.uid.is_none() {
                errors.push(ValidationError::required(
                    run_as_user.child("uid"),
                    "MustRunAs requires a uid",
                ));
            }
        }
        RunAsUserStrategyType::MustRunAsRange => {
            let key = policy.run_as_user.allocated_id_annotation.as_deref();
            if key.map_or(true, |k| k.trim().is_empty()) {
                errors.push(ValidationError::required(
                    run_as_user.child("allocatedIdAnnotation"),
                    "MustRunAsRange requires an allocated id annotation",
                ));
            }
        }
        RunAsUserStrategyType::MustRunAsNonRoot | RunAsUserStrategyType::RunAsAny => {}
        RunAsUserStrategyType::Unrecognized(name) => {
            errors.push(ValidationError::not_supported(
                run_as_user.child("type"),
                name,
                &[
                    RunAsUserStrategyType::MustRunAs.to_string(),
                    RunAsUserStrategyType::MustRunAsRange.to_string(),
                    RunAsUserStrategyType::MustRunAsNonRoot.to_string(),
                    RunAsUserStrategyType::RunAsAny.to_string(),
                ],
            ));
        }
    }
    if let Some(uid) = policy.run_as_user.uid {
        if uid < 0 {
            errors.push(ValidationError::invalid(
                run_as_user.child("uid"),
                uid,
                "uid must be non-negative",
            ));
        }
    }

    let se_linux = FieldPath::new("seLinuxContext");
    match &policy.se_linux_context.strategy {
        SELinuxStrategyType::MustRunAs => {
            if policy.se_linux_context.se_linux_options.is_none() {
                errors.push(ValidationError::required(
                    se_linux.child("seLinuxOptions"),
                    "MustRunAs requires SELinux options",
                ));
            }
        }
        SELinuxStrategyType::RunAsAny => {}
        SELinuxStrategyType::Unrecognized(name) => {
            errors.push(ValidationError::not_supported(
                se_linux.child("type"),
                name,
                &[
                    SELinuxStrategyType::MustRunAs.to_string(),
                    SELinuxStrategyType::RunAsAny.to_string(),
                ],
            ));
        }
    }

    let seccomp = FieldPath::new("seccomp").child("allowedProfiles");
    for (i, profile) in policy.seccomp.allowed_profiles.iter().enumerate() {
        if profile.trim().is_empty() {
            errors.push(ValidationError::invalid(
                seccomp.index(i),
                profile,
                "profile name must not be empty",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validates every policy in a set, plus name uniqueness across the set.
/// Each error names the policy it came from.
pub fn validate_policy_set(policies: &[Policy]) -> Result<(), ValidationErrorList> {
    let mut errors = ValidationErrorList::new();
    let mut seen = HashSet::new();

    for policy in policies {
        if let Err(errs) = validate_policy(policy) {
            errors.extend(errs.attributed_to(&policy.name));
        }
        if !policy.name.is_empty() && !seen.insert(policy.name.as_str()) {
            errors.push(ValidationError::invalid(
                FieldPath::new("name"),
                &policy.name,
                "duplicate policy name",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
