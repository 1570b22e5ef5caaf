//! The machine join protocol (spec §6): "On join, the machine presents a
//! join token; the server creates a `Link{id=machine-uuid}` and a
//! `Machine{}` resource."

use domain_controllers::types::{LinkSpec, MachineSpec};
use resource_store::{LabelQuery, Namespace, ResourceRef, Spec, Store};

use crate::error::{self, Result};
use crate::types::{JoinTokenSpec, JoinTokenStatusSpec};

/// Redeems `secret` and registers `machine_id` (spec's "machine-uuid") as a
/// newly joined machine, returning the `Link` that now tunnels its traffic.
/// Fails with [`error::Error::InvalidJoinToken`] if no unexpired,
/// unconsumed token matches, and with [`error::Error::AlreadyJoined`] if
/// `machine_id` already has a `Link`.
pub async fn join(store: &Store, now: u64, machine_id: &str, secret: &str) -> Result<LinkSpec> {
    let ns = Namespace::default_ns();

    let link_ref = ResourceRef::new(ns.clone(), LinkSpec::TYPE, machine_id);
    if store.get::<LinkSpec>(&link_ref).await.is_ok() {
        return error::AlreadyJoinedSnafu { machine_id: machine_id.to_owned() }.fail();
    }

    let tokens: Vec<resource_store::Resource<JoinTokenSpec>> = store.list(&ns, &LabelQuery::new()).await?;
    let token = tokens
        .into_iter()
        .find(|t| t.spec.secret == secret && t.spec.expires_at.is_none_or(|exp| exp > now));
    let Some(token) = token else {
        return error::InvalidJoinTokenSnafu.fail();
    };

    let statuses: Vec<resource_store::Resource<JoinTokenStatusSpec>> = store.list(&ns, &LabelQuery::new()).await?;
    if statuses.into_iter().any(|s| s.metadata.id == token.metadata.id) {
        return error::InvalidJoinTokenSnafu.fail();
    }

    let link = store.create(&ns, machine_id, LinkSpec { machine_id: machine_id.to_owned(), connected_at: now }).await?;
    store.create(&ns, machine_id, MachineSpec::default()).await?;
    store
        .create(
            &ns,
            token.metadata.id.clone(),
            JoinTokenStatusSpec { consumed_by_machine_id: machine_id.to_owned(), consumed_at: now },
        )
        .await?;

    Ok(link.spec)
}
