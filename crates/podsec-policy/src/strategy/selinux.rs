//! SELinux label strategies.

use podsec_core::{
    Container, FieldPath, Pod, SELinuxOptions, ValidationError, ValidationErrorList,
};

use crate::error::{PolicyError, PolicyResult};
use crate::strategy::security_context_path;
use crate::types::{SELinuxStrategyOptions, SELinuxStrategyType};

fn se_linux_options_path() -> FieldPath {
    security_context_path().child("seLinuxOptions")
}

pub enum SELinuxStrategy {
    /// Pins every container to one label.
    MustRunAs(SELinuxOptions),
    /// Leaves the label to the caller.
    RunAsAny,
}

impl SELinuxStrategy {
    pub fn from_options(options: &SELinuxStrategyOptions) -> PolicyResult<Self> {
        match &options.strategy {
            SELinuxStrategyType::MustRunAs => options
                .se_linux_options
                .clone()
                .map(SELinuxStrategy::MustRunAs)
                .ok_or_else(|| {
                    PolicyError::Configuration(
                        "MustRunAs requires SELinux options".to_string(),
                    )
                }),
            SELinuxStrategyType::RunAsAny => Ok(SELinuxStrategy::RunAsAny),
            SELinuxStrategyType::Unrecognized(name) => Err(PolicyError::Configuration(format!(
                "unrecognized SELinux strategy type {}",
                name
            ))),
        }
    }

    pub fn generate(
        &self,
        _pod: &Pod,
        container: &Container,
    ) -> PolicyResult<Option<SELinuxOptions>> {
        match self {
            SELinuxStrategy::MustRunAs(label) => Ok(Some(label.clone())),
            SELinuxStrategy::RunAsAny => Ok(container
                .security_context
                .as_ref()
                .and_then(|sc| sc.se_linux_options.clone())),
        }
    }

    /// `MustRunAs` demands an exact match of every label field; defaults
    /// are never merged in here.
    pub fn validate(&self, _pod: &Pod, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        let SELinuxStrategy::MustRunAs(required) = self else {
            return errs;
        };

        let Some(sc) = &container.security_context else {
            errs.push(ValidationError::required(
                security_context_path(),
                format!(
                    "unable to validate nil security context for container {}",
                    container.name
                ),
            ));
            return errs;
        };
        let Some(actual) = &sc.se_linux_options else {
            errs.push(ValidationError::required(
                se_linux_options_path(),
                format!(
                    "unable to validate nil seLinuxOptions for container {}",
                    container.name
                ),
            ));
            return errs;
        };

        let path = se_linux_options_path();
        let fields = [
            ("user", &actual.user, &required.user),
            ("role", &actual.role, &required.role),
            ("type", &actual.type_label, &required.type_label),
            ("level", &actual.level, &required.level),
        ];
        for (name, got, want) in fields {
            if got != want {
                errs.push(ValidationError::invalid(
                    path.child(name),
                    got,
                    format!(
                        "seLinuxOptions.{} on container {} must be {}",
                        name, container.name, want
                    ),
                ));
            }
        }
        if actual.disabled != required.disabled {
            errs.push(ValidationError::invalid(
                path.child("disabled"),
                actual.disabled,
                format!(
                    "seLinuxOptions.disabled on container {} must be {}",
                    container.name, required.disabled
                ),
            ));
        }
        errs
    }
}
