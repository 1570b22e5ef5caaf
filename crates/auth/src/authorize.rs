//! The authorization decision (spec §4.7) and the resource-class tables it
//! depends on, plus the loopback exception for unsigned local requests.

use crate::error::{self, Result};
use crate::role::{AccessPolicySpec, Role};

/// Resource kinds that require `Admin` regardless of verb (spec §4.7 step
/// 3: "admin-only resources").
pub const ADMIN_ONLY_KINDS: &[&str] = &[
    "Identities.omni.sidero.dev",
    "Users.omni.sidero.dev",
    "AccessPolicies.omni.sidero.dev",
    "SAMLLabelRules.omni.sidero.dev",
    "EtcdBackupS3Confs.omni.sidero.dev",
    "AuditLogs.omni.sidero.dev",
    "ServiceAccounts.omni.sidero.dev",
    "JoinTokens.omni.sidero.dev",
];

/// Resource kinds readable (and, per spec, gated only by a valid signature,
/// never by role) by anyone signed in (spec §4.7 step 4: "public-read").
pub const PUBLIC_READ_KINDS: &[&str] = &[
    "ResourceDefinitions.omni.sidero.dev",
    "Namespaces.omni.sidero.dev",
    "CurrentUsers.omni.sidero.dev",
    "InstallationMedia.omni.sidero.dev",
];

/// Resource kinds the loopback resource server allows unsigned, read-only
/// access to (spec §4.7: "except on a local-loopback resource server that
/// grants read-only access to a denylist-gated set of resource types"). The
/// type is named a *denylist* in the spec; this constant holds what that
/// denylist excludes -- kinds carrying secret material are never loopback
/// readable even unauthenticated-read-only.
pub const LOOPBACK_DENIED_KINDS: &[&str] =
    &["ClusterSecrets.omni.sidero.dev", "ServiceAccounts.omni.sidero.dev", "EtcdBackupS3Confs.omni.sidero.dev"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    Read,
    Write,
}

/// The request's transport context relevant to authorization: whether it
/// arrived over the local loopback surface (spec §4.7's unsigned-access
/// exception).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transport {
    Loopback,
    Network,
}

pub fn is_admin_only(kind: &str) -> bool {
    ADMIN_ONLY_KINDS.contains(&kind)
}

pub fn is_public_read(kind: &str) -> bool {
    PUBLIC_READ_KINDS.contains(&kind)
}

fn is_loopback_readable(kind: &str) -> bool {
    !LOOPBACK_DENIED_KINDS.contains(&kind)
}

/// The verb/role gate from spec §4.7 step 3 (public-read kinds, step 4,
/// bypass the role check entirely but still require a signature off
/// loopback).
fn required_role(verb: Verb, kind: &str) -> Role {
    if is_public_read(kind) {
        return Role::None;
    }
    if is_admin_only(kind) {
        return Role::Admin;
    }
    match verb {
        Verb::Read => Role::Reader,
        Verb::Write => Role::Operator,
    }
}

/// A fully-resolved request ready for the verb/role gate: the identity's
/// base role, an optional access policy to raise it against a targeted
/// cluster, and whether the caller presented a valid signature at all.
pub struct AuthorizationRequest<'a> {
    pub transport: Transport,
    pub signed: bool,
    pub identity_key: String,
    pub base_role: Role,
    pub policy: Option<&'a AccessPolicySpec>,
    pub target_cluster: Option<&'a str>,
    pub kind: &'a str,
    pub verb: Verb,
}

/// Runs the full spec §4.7 decision: signature presence, role resolution,
/// then the verb/role gate. Returns `Ok(())` if the request is authorized.
pub fn authorize(request: &AuthorizationRequest<'_>) -> Result<()> {
    if !request.signed {
        if request.transport == Transport::Loopback && request.verb == Verb::Read && is_loopback_readable(request.kind) {
            return Ok(());
        }
        return error::UnauthenticatedSnafu { message: "request carries no valid signature".to_owned() }.fail();
    }

    if is_public_read(request.kind) {
        return Ok(());
    }

    let effective = match request.policy {
        Some(policy) => policy.effective_role(request.base_role, &request.identity_key, request.target_cluster),
        None => request.base_role,
    };

    let required = required_role(request.verb, request.kind);
    if effective.satisfies(required) {
        Ok(())
    } else {
        error::PermissionDeniedSnafu {
            message: format!("role {effective:?} does not satisfy required role {required:?} for {}", request.kind),
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::PolicyRule;

    fn base(kind: &'static str, verb: Verb, base_role: Role) -> AuthorizationRequest<'static> {
        AuthorizationRequest {
            transport: Transport::Network,
            signed: true,
            identity_key: "alice@example.com".into(),
            base_role,
            policy: None,
            target_cluster: None,
            kind,
            verb,
        }
    }

    #[test]
    fn unsigned_network_request_is_unauthenticated() {
        let mut req = base("Clusters.omni.sidero.dev", Verb::Read, Role::Admin);
        req.signed = false;
        let err = authorize(&req).unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::Unauthenticated);
    }

    #[test]
    fn loopback_unsigned_read_of_non_denylisted_kind_is_allowed() {
        let mut req = base("Namespaces.omni.sidero.dev", Verb::Read, Role::None);
        req.signed = false;
        req.transport = Transport::Loopback;
        assert!(authorize(&req).is_ok());
    }

    #[test]
    fn loopback_unsigned_read_of_secret_kind_is_still_denied() {
        let mut req = base("ClusterSecrets.omni.sidero.dev", Verb::Read, Role::None);
        req.signed = false;
        req.transport = Transport::Loopback;
        assert!(authorize(&req).is_err());
    }

    #[test]
    fn reader_cannot_write() {
        let req = base("Clusters.omni.sidero.dev", Verb::Write, Role::Reader);
        let err = authorize(&req).unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::PermissionDenied);
    }

    #[test]
    fn admin_only_kind_rejects_operator() {
        let req = base("Users.omni.sidero.dev", Verb::Read, Role::Operator);
        assert!(authorize(&req).is_err());
        let req = base("Users.omni.sidero.dev", Verb::Read, Role::Admin);
        assert!(authorize(&req).is_ok());
    }

    #[test]
    fn public_read_kind_needs_no_role_but_still_a_signature() {
        let req = base("ResourceDefinitions.omni.sidero.dev", Verb::Read, Role::None);
        assert!(authorize(&req).is_ok());
    }

    #[test]
    fn policy_can_raise_a_reader_to_operator_for_its_cluster() {
        let policy = AccessPolicySpec {
            rules: vec![PolicyRule { users: vec!["alice@example.com".into()], clusters: vec!["c1".into()], role: Role::Operator }],
        };
        let mut req = base("Clusters.omni.sidero.dev", Verb::Write, Role::Reader);
        req.policy = Some(&policy);
        req.target_cluster = Some("c1");
        assert!(authorize(&req).is_ok());
    }
}
