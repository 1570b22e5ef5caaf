//! Lookups the middleware pipeline needs but doesn't own: a caller's public
//! key (to verify its signature) and its base role plus any `AccessPolicy`
//! that applies to it (spec §4.7 steps 1-2). Both are trait objects so the
//! pipeline itself never depends on how `Identities`/`Users`/
//! `ServiceAccounts`/`AccessPolicies` are actually stored -- in this
//! workspace they live in `resource_store::Store` like everything else, but
//! the pipeline is testable with a fake directory instead of a whole store.

use async_trait::async_trait;
use sequoia_openpgp::Cert;

use auth::{AccessPolicySpec, Role};

/// Resolves a request's `keyId` to the OpenPGP certificate that should
/// verify its signature, plus the identity string that key belongs to
/// (spec §4.7 step 1: "Resolve the signing identity to a User (or
/// ServiceAccount)"). The key fingerprint on the wire and the identity it
/// authenticates are looked up together since a directory only ever
/// registers a key against one identity.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn resolve(&self, key_id: &str) -> Option<ResolvedIdentity>;
}

/// What a directory lookup of a `keyId` returns: the certificate to verify
/// the signature against, the resolved identity string (an email, or a
/// service-account full ID), and whether that identity is a human user
/// (subject to the key-lifetime cap) or a service account (not).
pub struct ResolvedIdentity {
    pub cert: Cert,
    pub identity_key: String,
    pub is_user: bool,
}

/// Resolves an identity's base role and applicable `AccessPolicy` (spec
/// §4.7 step 2).
#[async_trait]
pub trait PolicyDirectory: Send + Sync {
    async fn base_role(&self, identity_key: &str) -> Role;

    async fn access_policy(&self, identity_key: &str) -> Option<AccessPolicySpec>;
}
