use podsec_core::{Principal, StoreResult};

use crate::types::Policy;

/// Source of every policy visible to the admission controller.
pub trait PolicyStore: Send + Sync {
    fn list_policies(&self) -> StoreResult<Vec<Policy>>;
}

/// Returns the policies whose ACL admits `principal`, ordered by name.
///
/// The order is what the admission walk follows, so it must not depend on
/// how the store happened to return the policies.
pub fn select_candidates<'p>(policies: &'p [Policy], principal: &Principal) -> Vec<&'p Policy> {
    let mut candidates: Vec<&Policy> = policies
        .iter()
        .filter(|policy| policy.acl.admits(principal))
        .collect();
    candidates.sort_by(|a, b| a.name.cmp(&b.name));
    tracing::debug!(
        principal = %principal,
        visible = policies.len(),
        candidates = candidates.len(),
        "selected candidate policies"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        PolicyAcl, RunAsUserStrategyOptions, RunAsUserStrategyType, SELinuxStrategyOptions,
        SELinuxStrategyType, SeccompStrategyOptions,
    };

    fn policy(name: &str, users: &[&str], groups: &[&str]) -> Policy {
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
            allow_privileged_container: false,
            allowed_capabilities: vec![],
            allow_host_dir_volume_plugin: false,
            acl: PolicyAcl {
                users: users.iter().map(|u| u.to_string()).collect(),
                groups: groups.iter().map(|g| g.to_string()).collect(),
            },
        }
    }

    fn principal() -> Principal {
        Principal::new(
            "system:serviceaccount:team-a:builder",
            vec!["system:serviceaccounts".to_string()],
        )
    }

    #[test]
    fn test_filters_by_user_or_group() {
        let policies = vec![
            policy("by-user", &["system:serviceaccount:team-a:builder"], &[]),
            policy("by-group", &[], &["system:serviceaccounts"]),
            policy("other", &["alice"], &["admins"]),
        ];
        let names: Vec<&str> = select_candidates(&policies, &principal())
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["by-group", "by-user"]);
    }

    #[test]
    fn test_order_is_independent_of_input_order() {
        let mut policies = vec![
            policy("restricted", &[], &["system:serviceaccounts"]),
            policy("anyuid", &[], &["system:serviceaccounts"]),
            policy("privileged", &[], &["system:serviceaccounts"]),
        ];
        let forward: Vec<String> = select_candidates(&policies, &principal())
            .iter()
            .map(|p| p.name.clone())
            .collect();
        policies.reverse();
        let backward: Vec<String> = select_candidates(&policies, &principal())
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(forward, vec!["anyuid", "privileged", "restricted"]);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_no_membership_yields_nothing() {
        let policies = vec![policy("privileged", &["root"], &["system:masters"])];
        assert!(select_candidates(&policies, &principal()).is_empty());
    }
}
