//! Per-dimension strategies.
//!
//! Each dimension exposes a closed enum of variants selected once, when a
//! provider is built from a policy. Every variant offers the same pair of
//! operations: `generate` proposes a value for a field the caller left
//! empty, `validate` checks the value that ended up on the container and
//! reports every violation it finds.

pub mod seccomp;
pub mod selinux;
pub mod user;

pub use seccomp::SeccompStrategy;
pub use selinux::SELinuxStrategy;
pub use user::RunAsUserStrategy;

use podsec_core::FieldPath;

/// Root of every container-level field path the strategies report.
pub(crate) fn security_context_path() -> FieldPath {
    FieldPath::new("securityContext")
}
