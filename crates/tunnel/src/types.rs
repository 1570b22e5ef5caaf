//! Resource types owned by the tunnel surface (spec §6): join tokens
//! machines present on first contact, plus the `Link`/`Machine` resources
//! that join creates. `Link`/`Machine`'s own `Spec` types live in
//! `domain-controllers` since node-audit and allocation logic also
//! reference them; only the join token itself is tunnel-owned.

use resource_store::Spec;
use serde::{Deserialize, Serialize};

/// A single-use credential a machine presents to join (spec §6: "the
/// machine presents a join token"). Admin-managed, admin-only (see
/// `auth::authorize::ADMIN_ONLY_KINDS`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JoinTokenSpec {
    pub secret: String,
    pub expires_at: Option<u64>,
}

impl Spec for JoinTokenSpec {
    const TYPE: &'static str = "JoinTokens.omni.sidero.dev";
}

/// Recorded once a token is redeemed, so a token can only ever join one
/// machine (spec is silent on token reuse; this crate treats a join token
/// the way the rest of the workspace treats any other single-use secret --
/// redeemed exactly once, independent of the resource's own `Phase`).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct JoinTokenStatusSpec {
    pub consumed_by_machine_id: String,
    pub consumed_at: u64,
}

impl Spec for JoinTokenStatusSpec {
    const TYPE: &'static str = "JoinTokenStatuses.omni.sidero.dev";
}
