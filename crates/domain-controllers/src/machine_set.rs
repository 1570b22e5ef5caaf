//! The `MachineSet` controller (spec §4.3): turns `MachineSetNode`
//! assignments (manual or auto-provisioned) into `ClusterMachine` resources,
//! and tracks aggregate phase.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Spec as _, Store};
use tracing::instrument;

use crate::types::{labels, ClusterMachineSpec, MachineSetNodeSpec, MachineSetPhase, MachineSetSpec, MachineSetStatusSpec};

pub struct MachineSetController {
    store: Arc<Store>,
}

impl MachineSetController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Members currently bound into this set (spec §4.3: ClusterMachine
    /// creation/destruction is driven off MachineSetNode assignments).
    async fn assigned_nodes(&self, set_ref: &ResourceRef) -> Result<Vec<Resource<MachineSetNodeSpec>>> {
        self.store
            .list(
                &set_ref.namespace,
                &LabelQuery::new().equals(labels::MACHINE_SET_ID, set_ref.id.0.as_str()),
            )
            .await
    }

    async fn cluster_machines(&self, set_ref: &ResourceRef) -> Result<Vec<Resource<ClusterMachineSpec>>> {
        self.store
            .list(
                &set_ref.namespace,
                &LabelQuery::new().equals(labels::MACHINE_SET_ID, set_ref.id.0.as_str()),
            )
            .await
    }

    /// Reconciles the set of `ClusterMachine`s against `assigned`, honoring
    /// `max_parallelism` for how many may be created or destroyed in a
    /// single reconcile pass (spec §4.3 "Update/DeleteStrategy").
    async fn sync_members(
        &self,
        set_ref: &ResourceRef,
        set: &MachineSetSpec,
        assigned: &[Resource<MachineSetNodeSpec>],
        existing: &[Resource<ClusterMachineSpec>],
        max_parallelism: Option<u32>,
    ) -> Result<()> {
        let assigned_ids: BTreeSet<&str> = assigned.iter().map(|n| n.spec.machine_id.as_str()).collect();
        let existing_ids: BTreeSet<&str> = existing.iter().map(|m| m.metadata.id.0.as_str()).collect();

        let to_create: Vec<&str> = assigned_ids.difference(&existing_ids).copied().collect();
        let to_destroy: Vec<&str> = existing_ids.difference(&assigned_ids).copied().collect();

        let cap = max_parallelism.map(|m| m as usize).unwrap_or(usize::MAX);

        let is_first_member = existing.is_empty();
        for (index, machine_id) in to_create.into_iter().take(cap).enumerate() {
            let mut spec_labels = resource_store::Labels::new();
            spec_labels.insert(labels::CLUSTER_ID.to_owned(), set.cluster_id.clone());
            spec_labels.insert(labels::MACHINE_SET_ID.to_owned(), set_ref.id.0.clone());
            spec_labels.insert(labels::ROLE.to_owned(), role_label(set.role).to_owned());

            let cluster_machine = ClusterMachineSpec {
                cluster_id: set.cluster_id.clone(),
                machine_set_id: set_ref.id.0.clone(),
                role: set.role,
            };
            let created = self.store.create(&set_ref.namespace, machine_id, cluster_machine).await?;

            // The first control-plane member of a set carrying a
            // BootstrapSpec bootstraps etcd from the named snapshot instead
            // of from scratch (spec §4.3, §4.5).
            let bootstrap_annotation = (is_first_member && index == 0)
                .then_some(())
                .and_then(|()| set.bootstrap_spec.as_ref())
                .map(|bootstrap| (bootstrap.cluster_uuid.clone(), bootstrap.snapshot.clone()));

            self.store
                .update_with_conflicts::<ClusterMachineSpec>(&created.metadata.reference(), 3, move |_spec, meta| {
                    meta.labels = spec_labels.clone();
                    if let Some((cluster_uuid, snapshot)) = &bootstrap_annotation {
                        meta.annotations.insert("bootstrap.cluster-uuid".to_owned(), cluster_uuid.clone());
                        if let Some(snapshot) = snapshot {
                            meta.annotations.insert("bootstrap.snapshot".to_owned(), snapshot.clone());
                        }
                    }
                })
                .await?;
        }

        for machine_id in to_destroy.into_iter().take(cap) {
            let reference = ResourceRef::new(set_ref.namespace.clone(), ClusterMachineSpec::TYPE, machine_id);
            self.store.teardown(&reference).await?;
        }

        Ok(())
    }

    /// Whether any member is mid-apply, per spec §4.3 "Reconfigure
    /// detection": any rendered config differing from its last-applied SHA,
    /// i.e. not yet back to the `Running` stage.
    async fn is_reconfiguring(&self, set_ref: &ResourceRef, existing: &[Resource<ClusterMachineSpec>]) -> Result<bool> {
        for machine in existing {
            let status_ref =
                ResourceRef::new(set_ref.namespace.clone(), config_render::ClusterMachineConfigStatus::TYPE, machine.metadata.id.clone());
            if let Ok(status) = self.store.get::<config_render::ClusterMachineConfigStatus>(&status_ref).await {
                if !status.spec.stage.is_running() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

fn role_label(role: crate::types::MachineSetRole) -> &'static str {
    match role {
        crate::types::MachineSetRole::ControlPlane => "control-plane",
        crate::types::MachineSetRole::Worker => "worker",
        crate::types::MachineSetRole::Extra => "extra",
    }
}

#[async_trait]
impl Controller for MachineSetController {
    fn name(&self) -> &str {
        "machine-set"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![
            InputDecl::strong(MachineSetSpec::TYPE),
            InputDecl::strong(MachineSetNodeSpec::TYPE),
            InputDecl::weak(ClusterMachineSpec::TYPE),
        ]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::exclusive(ClusterMachineSpec::TYPE), OutputDecl::exclusive(MachineSetStatusSpec::TYPE)]
    }

    #[instrument(name = "reconcile_machine_set", skip(self), fields(machine_set = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let set_ref = ResourceRef::new(trigger.namespace.clone(), MachineSetSpec::TYPE, trigger.id.clone());
        let set: Resource<MachineSetSpec> = match self.store.get(&set_ref).await {
            Ok(set) => set,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => {
                return Ok(ReconcileAction::Complete);
            }
            Err(err) => return Err(err),
        };

        let assigned = self.assigned_nodes(&set_ref).await?;
        let existing = self.cluster_machines(&set_ref).await?;

        if set.metadata.is_tearing_down() {
            if existing.is_empty() {
                self.store
                    .update_with_conflicts::<MachineSetSpec>(&set_ref, 3, |_s, meta| {
                        meta.remove_finalizer(MACHINE_SET_FINALIZER);
                    })
                    .await?;
            } else {
                self.sync_members(&set_ref, &set.spec, &[], &existing, None).await?;
            }
            return Ok(ReconcileAction::Complete);
        }

        if !set.metadata.has_finalizer(MACHINE_SET_FINALIZER) {
            self.store
                .update_with_conflicts::<MachineSetSpec>(&set_ref, 3, |_s, meta| {
                    meta.add_finalizer(MACHINE_SET_FINALIZER);
                })
                .await?;
        }

        let max_parallelism =
            if existing.len() <= assigned.len() { set.spec.update_strategy.max_parallelism() } else { set.spec.delete_strategy.max_parallelism() };

        self.sync_members(&set_ref, &set.spec, &assigned, &existing, max_parallelism).await?;

        let phase = if existing.len() < assigned.len() {
            MachineSetPhase::ScalingUp
        } else if existing.len() > assigned.len() {
            MachineSetPhase::ScalingDown
        } else if self.is_reconfiguring(&set_ref, &existing).await? {
            MachineSetPhase::Reconfiguring
        } else {
            MachineSetPhase::Running
        };

        let status_ref = ResourceRef::new(set_ref.namespace.clone(), MachineSetStatusSpec::TYPE, set_ref.id.0.clone());
        let status = MachineSetStatusSpec { phase };
        match self.store.get::<MachineSetStatusSpec>(&status_ref).await {
            Ok(_) => {
                self.store
                    .update_with_conflicts::<MachineSetStatusSpec>(&status_ref, 3, |s, _m| *s = status.clone())
                    .await?;
            }
            Err(_) => {
                self.store.create(&set_ref.namespace, set_ref.id.0.clone(), status).await?;
            }
        }

        Ok(ReconcileAction::Complete)
    }
}

/// Held until every `ClusterMachine` it owns is destroyed.
const MACHINE_SET_FINALIZER: &str = "domain-controllers/machine-set";
