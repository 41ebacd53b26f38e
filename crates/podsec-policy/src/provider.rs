use podsec_core::{
    seccomp_container_annotation_key, Container, FieldPath, Pod, SecurityContext,
    ValidationError, ValidationErrorList, VolumeStore, SECCOMP_POD_ANNOTATION_KEY,
};

use crate::allocator::Allocator;
use crate::error::{PolicyError, PolicyResult};
use crate::strategy::{
    security_context_path, RunAsUserStrategy, SELinuxStrategy, SeccompStrategy,
};
use crate::types::{AdmissionOptions, Policy};
use crate::validation::validate_policy;

// ---------------------------------------------------------------------------
// PolicyProvider — one policy bound to one strategy per dimension
// ---------------------------------------------------------------------------

/// Generates and validates container security contexts against a single
/// policy. Built fresh for every admission request.
pub struct PolicyProvider<'a> {
    policy: &'a Policy,
    run_as_user: RunAsUserStrategy<'a>,
    se_linux: SELinuxStrategy,
    seccomp: SeccompStrategy,
    volumes: &'a dyn VolumeStore,
}

impl<'a> PolicyProvider<'a> {
    /// Fails with `PolicyError::Configuration` when the policy's shape is
    /// invalid or declares a strategy this engine does not know.
    pub fn new(
        policy: &'a Policy,
        allocator: &'a Allocator<'a>,
        volumes: &'a dyn VolumeStore,
        options: &AdmissionOptions,
    ) -> PolicyResult<Self> {
        validate_policy(policy).map_err(|errs| {
            PolicyError::Configuration(format!("policy \"{}\" is invalid: {}", policy.name, errs))
        })?;

        Ok(Self {
            policy,
            run_as_user: RunAsUserStrategy::from_options(
                &policy.run_as_user,
                allocator,
                options.non_root_fallback_uid,
            )?,
            se_linux: SELinuxStrategy::from_options(&policy.se_linux_context)?,
            seccomp: SeccompStrategy::from_options(&policy.seccomp),
            volumes,
        })
    }

    /// Name of the bound policy, for attribution only.
    pub fn policy_name(&self) -> &str {
        &self.policy.name
    }

    /// Builds the security context this policy would give the container.
    ///
    /// Fields the caller already set are kept; only absent ones are
    /// generated. Requested capability additions are narrowed to the
    /// policy's allow-list, drops pass through. The first generate failure
    /// aborts.
    pub fn create_security_context(
        &self,
        pod: &Pod,
        container: &Container,
    ) -> PolicyResult<SecurityContext> {
        let mut ctx = container.security_context.clone().unwrap_or_default();

        if ctx.run_as_user.is_none() {
            ctx.run_as_user = self.run_as_user.generate(pod, container)?;
        }
        if ctx.se_linux_options.is_none() {
            ctx.se_linux_options = self.se_linux.generate(pod, container)?;
        }
        if ctx.seccomp_profile.is_none() {
            ctx.seccomp_profile = match pod.seccomp_profile_for(&container.name) {
                Some(profile) => Some(profile.to_string()),
                None => self.seccomp.generate(pod, container)?,
            };
        }
        if ctx.privileged.is_none() {
            ctx.privileged = Some(false);
        }
        if let Some(caps) = ctx.capabilities.as_mut() {
            caps.add
                .retain(|cap| self.policy.allowed_capabilities.contains(cap));
        }

        Ok(ctx)
    }

    /// Checks the container's current security context against every
    /// dimension of the policy. All violations are reported.
    pub fn validate_security_context(
        &self,
        pod: &Pod,
        container: &Container,
    ) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        let path = security_context_path();

        let Some(sc) = &container.security_context else {
            errs.push(ValidationError::required(
                path,
                format!("no security context set on container {}", container.name),
            ));
            return errs;
        };

        errs.extend(self.run_as_user.validate(pod, container));
        errs.extend(self.se_linux.validate(pod, container));
        errs.extend(self.seccomp.validate(pod, container));

        if sc.privileged == Some(true) && !self.policy.allow_privileged_container {
            errs.push(ValidationError::invalid(
                path.child("privileged"),
                true,
                "privileged containers are not allowed",
            ));
        }

        if let Some(caps) = &sc.capabilities {
            let add_path = path.child("capabilities").child("add");
            for (i, cap) in caps.add.iter().enumerate() {
                if !self.policy.allowed_capabilities.contains(cap) {
                    errs.push(ValidationError::invalid(
                        add_path.index(i),
                        cap,
                        format!("capability {} may not be added", cap),
                    ));
                }
            }
        }

        if !self.policy.allow_host_dir_volume_plugin {
            errs.extend(self.validate_volume_mounts(container));
        }

        errs
    }

    fn validate_volume_mounts(&self, container: &Container) -> ValidationErrorList {
        let mut errs = ValidationErrorList::new();
        let mounts_path = FieldPath::new("volumeMounts");
        for (i, mount) in container.volume_mounts.iter().enumerate() {
            match self.volumes.get_volume(&mount.name) {
                Ok(volume) => {
                    if let Some(host_path) = volume.host_path() {
                        errs.push(ValidationError::invalid(
                            mounts_path.index(i),
                            &mount.name,
                            format!("host path volumes are not allowed ({})", host_path),
                        ));
                    }
                }
                Err(e) => errs.push(ValidationError::internal(
                    mounts_path.index(i),
                    format!("unable to resolve volume {}: {}", mount.name, e),
                )),
            }
        }
        errs
    }
}

/// Writes a generated context onto the container at `index`, recording its
/// seccomp profile in the container annotation and, if still unset, the
/// pod annotation.
pub fn apply_security_context(
    pod: &mut Pod,
    index: usize,
    ctx: SecurityContext,
) -> PolicyResult<()> {
    let Some(container) = pod.spec.containers.get_mut(index) else {
        return Err(PolicyError::InvalidRequest(format!(
            "pod {} has no container at index {}",
            pod.name, index
        )));
    };
    let container_key = seccomp_container_annotation_key(&container.name);
    let profile = ctx.seccomp_profile.clone();
    container.security_context = Some(ctx);

    if let Some(profile) = profile {
        pod.annotations
            .entry(container_key)
            .or_insert_with(|| profile.clone());
        pod.annotations
            .entry(SECCOMP_POD_ANNOTATION_KEY.to_string())
            .or_insert(profile);
    }
    Ok(())
}
