//! The `kubernetes-upgrade` controller (spec §2 item 4): tracks convergence
//! onto `ClusterSpec.kubernetes_version`, staged control-plane-before-worker
//! per standard kubelet/API-server version-skew rules.
//!
//! Like [`crate::talos_upgrade`], the rollout itself rides the existing
//! config-render/apply path; this controller only observes and reports it.
//! The staging is enforced here as a read-only precondition on `Done`, not
//! by withholding a worker's rendered config -- `config-render` has no
//! notion of "wait for another machine set", so a future revision wanting
//! to actually gate the rollout would need to plumb that signal back into
//! `config_render::apply`.

use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Spec as _, Store};
use tracing::instrument;

use crate::types::{
    labels, ClusterMachineSpec, ClusterSpec, KubernetesUpgradeStatusSpec, MachineSetRole, MachineStatusSpec,
    UpgradePhase,
};

pub struct KubernetesUpgradeController {
    store: Arc<Store>,
}

impl KubernetesUpgradeController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    async fn cluster_machines(&self, ns: &resource_store::Namespace, cluster_id: &str) -> Result<Vec<Resource<ClusterMachineSpec>>> {
        self.store.list(ns, &LabelQuery::new().equals(labels::CLUSTER_ID, cluster_id)).await
    }

    async fn observed_kubernetes_version(&self, ns: &resource_store::Namespace, machine_id: &str) -> Result<Option<String>> {
        let reference = ResourceRef::new(ns.clone(), MachineStatusSpec::TYPE, machine_id);
        match self.store.get::<MachineStatusSpec>(&reference).await {
            Ok(status) => Ok(status.spec.kubernetes_version),
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Controller for KubernetesUpgradeController {
    fn name(&self) -> &str {
        "kubernetes-upgrade"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![
            InputDecl::strong(ClusterSpec::TYPE),
            InputDecl::strong(MachineStatusSpec::TYPE),
            InputDecl::weak(ClusterMachineSpec::TYPE),
        ]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::exclusive(KubernetesUpgradeStatusSpec::TYPE)]
    }

    #[instrument(name = "reconcile_kubernetes_upgrade", skip(self), fields(cluster = %trigger))]
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

        let mut control_plane_total = 0u32;
        let mut control_plane_upgraded = 0u32;
        let mut worker_total = 0u32;
        let mut worker_upgraded = 0u32;

        for machine in &machines {
            let machine_id = machine.metadata.id.0.as_str();
            let is_upgraded =
                self.observed_kubernetes_version(&ns, machine_id).await?.as_deref() == Some(cluster.spec.kubernetes_version.as_str());
            match machine.spec.role {
                MachineSetRole::ControlPlane => {
                    control_plane_total += 1;
                    if is_upgraded {
                        control_plane_upgraded += 1;
                    }
                }
                MachineSetRole::Worker | MachineSetRole::Extra => {
                    worker_total += 1;
                    if is_upgraded {
                        worker_upgraded += 1;
                    }
                }
            }
        }

        let control_plane_done = control_plane_total > 0 && control_plane_upgraded == control_plane_total;
        let total_machines = control_plane_total + worker_total;
        let phase = if total_machines == 0 {
            UpgradePhase::Idle
        } else if !control_plane_done {
            // Workers may already report the target version (they were
            // provisioned fresh, or raced ahead), but the cluster as a whole
            // can't be Done until skew rules are satisfied.
            UpgradePhase::InProgress
        } else if worker_upgraded == worker_total {
            UpgradePhase::Done
        } else {
            UpgradePhase::InProgress
        };

        let status = KubernetesUpgradeStatusSpec {
            target_version: cluster.spec.kubernetes_version.clone(),
            phase,
            control_plane_upgraded,
            control_plane_total,
            worker_upgraded,
            worker_total,
        };
        let status_ref = ResourceRef::new(ns.clone(), KubernetesUpgradeStatusSpec::TYPE, cluster_id.clone());
        if self.store.get::<KubernetesUpgradeStatusSpec>(&status_ref).await.is_ok() {
            self.store
                .update_with_conflicts::<KubernetesUpgradeStatusSpec>(&status_ref, 3, |spec, _meta| *spec = status.clone())
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

    async fn cluster_machine(store: &Store, ns: &Namespace, id: &str, cluster_id: &str, role: MachineSetRole) {
        let mut spec_labels = Labels::new();
        spec_labels.insert(labels::CLUSTER_ID.to_owned(), cluster_id.to_owned());
        let created = store
            .create(ns, id, ClusterMachineSpec { cluster_id: cluster_id.to_owned(), machine_set_id: "set".into(), role })
            .await
            .unwrap();
        store
            .update_with_conflicts::<ClusterMachineSpec>(&created.metadata.reference(), 3, move |_spec, meta| meta.labels = spec_labels.clone())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn workers_dont_count_as_done_until_control_plane_converges() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let controller = KubernetesUpgradeController::new(store.clone());
        let ns = Namespace::from("default");

        let cluster = store
            .create(&ns, "c1", ClusterSpec { talos_version: "v1.9.0".into(), kubernetes_version: "1.32.0".into(), backup_configuration: None, restore_from_etcd_backup_cluster_id: None })
            .await
            .unwrap();

        cluster_machine(&store, &ns, "cp1", "c1", MachineSetRole::ControlPlane).await;
        cluster_machine(&store, &ns, "w1", "c1", MachineSetRole::Worker).await;
        // Worker already on the new version; control plane isn't yet.
        store.create(&ns, "cp1", MachineStatusSpec { kubernetes_version: Some("1.31.0".into()), ..Default::default() }).await.unwrap();
        store.create(&ns, "w1", MachineStatusSpec { kubernetes_version: Some("1.32.0".into()), ..Default::default() }).await.unwrap();

        controller.reconcile(&cluster.metadata.reference()).await.unwrap();

        let status: Resource<KubernetesUpgradeStatusSpec> =
            store.get(&ResourceRef::new(ns.clone(), KubernetesUpgradeStatusSpec::TYPE, "c1")).await.unwrap();
        assert_eq!(status.spec.phase, UpgradePhase::InProgress);
        assert_eq!(status.spec.worker_upgraded, 1);
        assert_eq!(status.spec.control_plane_upgraded, 0);

        // Control plane catches up.
        store
            .update_with_conflicts::<MachineStatusSpec>(&ResourceRef::new(ns.clone(), MachineStatusSpec::TYPE, "cp1"), 3, |spec, _meta| {
                spec.kubernetes_version = Some("1.32.0".into())
            })
            .await
            .unwrap();
        controller.reconcile(&cluster.metadata.reference()).await.unwrap();

        let status: Resource<KubernetesUpgradeStatusSpec> =
            store.get(&ResourceRef::new(ns, KubernetesUpgradeStatusSpec::TYPE, "c1")).await.unwrap();
        assert_eq!(status.spec.phase, UpgradePhase::Done);
    }
}
