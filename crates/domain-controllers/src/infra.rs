//! Infra-provider-backed machine allocation (spec §4.3 "auto-provisioned"
//! MachineSets, §4.6 tenant isolation) and the `MachineRequest`
//! immutable-field enforcement (spec §4.4).
//!
//! Tenant scoping/ACL enforcement itself (who may read/write which
//! `infra-provider:<id>` namespace) lives in the `auth` crate; this module
//! only derives the internal-actor side: requesting machines and turning a
//! provider's fulfillment into a `MachineSetNode` assignment.

use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Store};

use crate::types::{
    labels, MachineRequestPhase, MachineRequestSpec, MachineRequestStatusSpec, MachineSetNodeSpec, MachineSetSpec,
};

/// Compares a proposed update against the stored spec and rejects any
/// structural change (spec §3.2 "Equality: for types declared immutable ...
/// an update whose Spec differs structurally is rejected", §4.4 "A
/// MachineRequest spec is immutable after create"). Called by whatever
/// writes a `MachineRequest` update (the `Store::update` mutator closure
/// doesn't have access to validators that need the prior version, so this
/// is enforced at the call site rather than via `Validator`).
pub async fn enforce_immutable(
    store: &Store,
    reference: &ResourceRef,
    new_spec: &MachineRequestSpec,
) -> Result<()> {
    let current: Resource<MachineRequestSpec> = store.get(reference).await?;
    if &current.spec != new_spec {
        return resource_store::error::ValidationErrorSnafu {
            reference: reference.clone(),
            message: "MachineRequest spec is immutable after create".to_owned(),
        }
        .fail();
    }
    Ok(())
}

/// Turns an auto-provisioned `MachineSet`'s `MachineAllocation` into
/// `MachineRequest`s, and promotes fulfilled requests into
/// `MachineSetNode` assignments.
pub struct InfraAllocationController {
    store: Arc<Store>,
}

impl InfraAllocationController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Controller for InfraAllocationController {
    fn name(&self) -> &str {
        "infra-allocation"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![InputDecl::strong(MachineSetSpec::TYPE), InputDecl::strong(MachineRequestStatusSpec::TYPE)]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::exclusive(MachineRequestSpec::TYPE), OutputDecl::shared(MachineSetNodeSpec::TYPE)]
    }

    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let set_ref = ResourceRef::new(trigger.namespace.clone(), MachineSetSpec::TYPE, trigger.id.clone());
        let set: Resource<MachineSetSpec> = match self.store.get(&set_ref).await {
            Ok(set) => set,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => return Ok(ReconcileAction::Complete),
            Err(err) => return Err(err),
        };

        let Some(allocation) = &set.spec.allocation else {
            return Ok(ReconcileAction::Complete);
        };

        let existing_requests: Vec<Resource<MachineRequestSpec>> = self
            .store
            .list(&set_ref.namespace, &LabelQuery::new().equals(labels::MACHINE_SET_ID, set_ref.id.0.as_str()))
            .await?;

        for index in existing_requests.len()..(allocation.count as usize) {
            let id = format!("{}-request-{index}", set_ref.id.0);
            let spec =
                MachineRequestSpec { class_name: allocation.class_name.clone(), infra_provider_id: String::new() };
            let created = self.store.create(&set_ref.namespace, id, spec).await?;
            self.store
                .update_with_conflicts::<MachineRequestSpec>(&created.metadata.reference(), 3, |_s, meta| {
                    meta.labels.insert(labels::MACHINE_SET_ID.to_owned(), set_ref.id.0.clone());
                })
                .await?;
        }

        for request in &existing_requests {
            let status_ref = ResourceRef::new(set_ref.namespace.clone(), MachineRequestStatusSpec::TYPE, request.metadata.id.clone());
            let Ok(status) = self.store.get::<MachineRequestStatusSpec>(&status_ref).await else {
                continue;
            };
            if status.spec.phase != MachineRequestPhase::Provisioned {
                continue;
            }
            let Some(machine_id) = &status.spec.machine_id else { continue };

            let node_ref = ResourceRef::new(set_ref.namespace.clone(), MachineSetNodeSpec::TYPE, machine_id.clone());
            if self.store.get::<MachineSetNodeSpec>(&node_ref).await.is_err() {
                self.store
                    .create(
                        &set_ref.namespace,
                        machine_id.clone(),
                        MachineSetNodeSpec { machine_set_id: set_ref.id.0.clone(), machine_id: machine_id.clone() },
                    )
                    .await?;
            }
        }

        Ok(ReconcileAction::Complete)
    }
}
