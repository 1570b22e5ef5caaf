//! The `talos-upgrade` controller (spec §2 item 4): tracks convergence of a
//! cluster's `ClusterMachine`s onto `ClusterSpec.talos_version`.
//!
//! The rollout itself is driven by the existing config-render/apply path --
//! a `talos_version` change re-renders every member's `ClusterMachineConfig`
//! with a new installer image, which `config_render::apply::decide` already
//! recognizes as reboot-requiring (spec §4.4). This controller only
//! aggregates the observed result into one status resource per cluster, the
//! same read-mostly shape as [`crate::node_audit::NodeAuditController`].

use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Spec as _, Store};
use tracing::instrument;

use crate::types::{labels, ClusterMachineSpec, ClusterSpec, MachineStatusSpec, TalosUpgradeStatusSpec, UpgradePhase};

pub struct TalosUpgradeController {
    store: Arc<Store>,
}

impl TalosUpgradeController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    async fn cluster_machines(&self, ns: &resource_store::Namespace, cluster_id: &str) -> Result<Vec<Resource<ClusterMachineSpec>>> {
        self.store.list(ns, &LabelQuery::new().equals(labels::CLUSTER_ID, cluster_id)).await
    }

    /// `None` when the machine has no `MachineStatus` yet (never connected).
    async fn observed_talos_version(&self, ns: &resource_store::Namespace, machine_id: &str) -> Result<Option<String>> {
        let reference = ResourceRef::new(ns.clone(), MachineStatusSpec::TYPE, machine_id);
        match self.store.get::<MachineStatusSpec>(&reference).await {
            Ok(status) => Ok(status.spec.talos_version),
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Controller for TalosUpgradeController {
    fn name(&self) -> &str {
        "talos-upgrade"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![
            InputDecl::strong(ClusterSpec::TYPE),
            InputDecl::strong(MachineStatusSpec::TYPE),
            InputDecl::weak(ClusterMachineSpec::TYPE),
        ]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::exclusive(TalosUpgradeStatusSpec::TYPE)]
    }

    #[instrument(name = "reconcile_talos_upgrade", skip(self), fields(cluster = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let cluster_ref = ResourceRef::new(trigger.namespace.clone(), ClusterSpec::TYPE, trigger.id.clone());
        let cluster: Resource<ClusterSpec> = match self.store.get(&cluster_ref).await {
            Ok(cluster) => cluster,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => return Ok(ReconcileAction::Complete),
            Err(err) => return Err(err),
        };

        let ns = cluster_ref.namespace.clone();
        let cluster_id = cluster_ref.id.0.clone();
        let machines = self.cluster_machines(&ns, &cluster_id).await?;
        let total_machines = machines.len() as u32;

        let mut upgraded_machines = 0u32;
        for machine in &machines {
            let machine_id = machine.metadata.id.0.as_str();
            if self.observed_talos_version(&ns, machine_id).await?.as_deref() == Some(cluster.spec.talos_version.as_str()) {
                upgraded_machines += 1;
            }
        }

        let phase = if total_machines == 0 {
            UpgradePhase::Idle
        } else if upgraded_machines == total_machines {
            UpgradePhase::Done
        } else {
            UpgradePhase::InProgress
        };

        let status = TalosUpgradeStatusSpec { target_version: cluster.spec.talos_version.clone(), phase, upgraded_machines, total_machines };
        let status_ref = ResourceRef::new(ns.clone(), TalosUpgradeStatusSpec::TYPE, cluster_id.clone());
        if self.store.get::<TalosUpgradeStatusSpec>(&status_ref).await.is_ok() {
            self.store
                .update_with_conflicts::<TalosUpgradeStatusSpec>(&status_ref, 3, |spec, _meta| *spec = status.clone())
                .await?;
        } else {
            self.store.create(&ns, cluster_id.clone(), status).await?;
        }
        Ok(ReconcileAction::Complete)
    }
}

#[cfg(test)]
mod tests {
    use resource_store::backend::memory::MemoryBackend;
    use resource_store::{Labels, Namespace};

    use super::*;

    async fn cluster_machine(store: &Store, ns: &Namespace, id: &str, cluster_id: &str) {
        let mut spec_labels = Labels::new();
        spec_labels.insert(labels::CLUSTER_ID.to_owned(), cluster_id.to_owned());
        let created = store
            .create(ns, id, ClusterMachineSpec { cluster_id: cluster_id.to_owned(), machine_set_id: "cp".into(), role: crate::types::MachineSetRole::ControlPlane })
            .await
            .unwrap();
        store
            .update_with_conflicts::<ClusterMachineSpec>(&created.metadata.reference(), 3, move |_spec, meta| meta.labels = spec_labels.clone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn aggregates_progress_from_machine_status() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let controller = TalosUpgradeController::new(store.clone());
        let ns = Namespace::from("default");

        let cluster = store
            .create(&ns, "c1", ClusterSpec { talos_version: "v1.9.0".into(), kubernetes_version: "1.31.0".into(), backup_configuration: None, restore_from_etcd_backup_cluster_id: None })
            .await
            .unwrap();

        cluster_machine(&store, &ns, "m1", "c1").await;
        cluster_machine(&store, &ns, "m2", "c1").await;
        store
            .create(&ns, "m1", MachineStatusSpec { talos_version: Some("v1.9.0".into()), ..Default::default() })
            .await
            .unwrap();
        store
            .create(&ns, "m2", MachineStatusSpec { talos_version: Some("v1.8.0".into()), ..Default::default() })
            .await
            .unwrap();

        controller.reconcile(&cluster.metadata.reference()).await.unwrap();

        let status: Resource<TalosUpgradeStatusSpec> =
            store.get(&ResourceRef::new(ns, TalosUpgradeStatusSpec::TYPE, "c1")).await.unwrap();
        assert_eq!(status.spec.phase, UpgradePhase::InProgress);
        assert_eq!(status.spec.upgraded_machines, 1);
        assert_eq!(status.spec.total_machines, 2);
    }

    #[tokio::test]
    async fn idle_when_no_machines() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let controller = TalosUpgradeController::new(store.clone());
        let ns = Namespace::from("default");

        let cluster = store
            .create(&ns, "c1", ClusterSpec { talos_version: "v1.9.0".into(), kubernetes_version: "1.31.0".into(), backup_configuration: None, restore_from_etcd_backup_cluster_id: None })
            .await
            .unwrap();
        controller.reconcile(&cluster.metadata.reference()).await.unwrap();

        let status: Resource<TalosUpgradeStatusSpec> =
            store.get(&ResourceRef::new(ns, TalosUpgradeStatusSpec::TYPE, "c1")).await.unwrap();
        assert_eq!(status.spec.phase, UpgradePhase::Idle);
    }
}
