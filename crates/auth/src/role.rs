//! Roles and `AccessPolicy` resolution (spec §4.7).
//!
//! `Role` carries a total order for the four base roles plus a fifth,
//! unordered `InfraProvider` role that belongs to a separate authorization
//! track (spec §4.6) rather than the `None < Reader < Operator < Admin`
//! chain.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Role {
    None,
    Reader,
    Operator,
    Admin,
    InfraProvider,
}

impl Role {
    fn rank(self) -> Option<u8> {
        match self {
            Role::None => Some(0),
            Role::Reader => Some(1),
            Role::Operator => Some(2),
            Role::Admin => Some(3),
            Role::InfraProvider => None,
        }
    }

    /// Whether `self` satisfies a `required` gate under the base-role total
    /// order. `InfraProvider` only satisfies a gate of `InfraProvider`
    /// itself -- it never substitutes for a base-role requirement, and no
    /// base role substitutes for it.
    pub fn satisfies(self, required: Role) -> bool {
        match (self.rank(), required.rank()) {
            (Some(have), Some(need)) => have >= need,
            _ => self == required,
        }
    }

    /// `max(baseRole, policyRole)` from spec §4.7 step 2. `InfraProvider`
    /// is excluded from this lattice; combining it with a base role just
    /// keeps the base role, since a single request is authorized under one
    /// track or the other, never both.
    #[must_use]
    pub fn max(self, other: Role) -> Role {
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => {
                if a >= b {
                    self
                } else {
                    other
                }
            }
            (Some(_), None) => self,
            (None, Some(_)) => other,
            (None, None) => self,
        }
    }
}

/// One `{users, clusters, role}` rule of an `AccessPolicy` (spec §4.7 step
/// 2). A rule applies to a request when the identity is in `users` and the
/// targeted cluster is in `clusters`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub users: Vec<String>,
    pub clusters: Vec<String>,
    pub role: Role,
}

/// Admin-managed, per-identity cluster role grants (spec §3.1 "Auth
/// domain").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
pub struct AccessPolicySpec {
    pub rules: Vec<PolicyRule>,
}

impl resource_store::Spec for AccessPolicySpec {
    const TYPE: &'static str = "AccessPolicies.omni.sidero.dev";
}

impl AccessPolicySpec {
    /// Resolves the effective role for `identity_key` against `base_role`
    /// (spec §4.7 step 2: "the effective role for a request targeting a
    /// cluster is `max(baseRole, policyRole)`. For requests not targeting a
    /// specific cluster, only the base role applies.").
    pub fn effective_role(&self, base_role: Role, identity_key: &str, cluster: Option<&str>) -> Role {
        let Some(cluster) = cluster else {
            return base_role;
        };
        self.rules
            .iter()
            .filter(|rule| rule.users.iter().any(|u| u == identity_key))
            .filter(|rule| rule.clusters.iter().any(|c| c == cluster))
            .fold(base_role, |acc, rule| acc.max(rule.role))
    }
}

/// A registered user (spec §3.1, admin-managed).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    pub email: String,
    pub base_role: Role,
}

impl resource_store::Spec for UserSpec {
    const TYPE: &'static str = "Users.omni.sidero.dev";
}

/// A registered service account's public-key material and base role (spec
/// §3.1, §4.7 signature verification).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ServiceAccountSpec {
    pub public_key_armored: String,
    pub base_role: Role,
    /// Unix-second self-signed key expiry; enforced against
    /// [`crate::signature::SERVICE_ACCOUNT_MAX_ALLOWED_LIFETIME`] for users
    /// at issuance time.
    pub key_created_at: u64,
    pub key_expires_at: Option<u64>,
}

impl resource_store::Spec for ServiceAccountSpec {
    const TYPE: &'static str = "ServiceAccounts.omni.sidero.dev";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_holds_for_base_roles() {
        assert!(Role::Admin.satisfies(Role::Operator));
        assert!(Role::Operator.satisfies(Role::Reader));
        assert!(!Role::Reader.satisfies(Role::Operator));
        assert!(Role::None.satisfies(Role::None));
        assert!(!Role::None.satisfies(Role::Reader));
    }

    #[test]
    fn infra_provider_is_unordered_against_base_roles() {
        assert!(!Role::InfraProvider.satisfies(Role::Reader));
        assert!(!Role::Admin.satisfies(Role::InfraProvider));
        assert!(Role::InfraProvider.satisfies(Role::InfraProvider));
    }

    #[test]
    fn policy_raises_role_only_for_matching_cluster_and_user() {
        let policy = AccessPolicySpec {
            rules: vec![PolicyRule {
                users: vec!["alice@example.com".into()],
                clusters: vec!["c1".into()],
                role: Role::Admin,
            }],
        };
        assert_eq!(policy.effective_role(Role::Reader, "alice@example.com", Some("c1")), Role::Admin);
        assert_eq!(policy.effective_role(Role::Reader, "alice@example.com", Some("c2")), Role::Reader);
        assert_eq!(policy.effective_role(Role::Reader, "bob@example.com", Some("c1")), Role::Reader);
        assert_eq!(policy.effective_role(Role::Reader, "alice@example.com", None), Role::Reader);
    }
}
