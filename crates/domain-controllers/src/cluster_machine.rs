//! `ClusterMachine` teardown (spec §4.3): cordon+drain and etcd-member
//! removal for control-plane members, non-blocking when the Kubernetes API
//! is unreachable.

use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{ResourceRef, Result, Spec as _, Store};
use tracing::{instrument, warn};

use crate::types::{ClusterMachineSpec, MachineSetRole};

/// Drains a Kubernetes node and, for control-plane members, removes it from
/// the etcd member list. Implemented separately from `cluster_machine` so
/// tests can substitute a fake that simulates an unreachable API server.
#[async_trait]
pub trait NodeDrainer: Send + Sync {
    async fn cordon_and_drain(&self, nodename: &str) -> DrainOutcome;
    async fn remove_etcd_member(&self, nodename: &str) -> DrainOutcome;
}

/// Whether a drain/removal step completed, or failed because the cluster's
/// Kubernetes API was unreachable -- which must not block teardown (spec
/// §4.3: "If the Kubernetes API is unreachable the teardown does not
/// block").
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrainOutcome {
    Completed,
    ApiUnreachable,
}

pub struct ClusterMachineController {
    store: Arc<Store>,
    drainer: Arc<dyn NodeDrainer>,
}

impl ClusterMachineController {
    pub fn new(store: Arc<Store>, drainer: Arc<dyn NodeDrainer>) -> Self {
        Self { store, drainer }
    }
}

#[async_trait]
impl Controller for ClusterMachineController {
    fn name(&self) -> &str {
        "cluster-machine-teardown"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![InputDecl::strong(ClusterMachineSpec::TYPE)]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::shared(ClusterMachineSpec::TYPE)]
    }

    #[instrument(name = "reconcile_cluster_machine", skip(self), fields(machine = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let machine_ref = ResourceRef::new(trigger.namespace.clone(), ClusterMachineSpec::TYPE, trigger.id.clone());
        let machine = match self.store.get::<ClusterMachineSpec>(&machine_ref).await {
            Ok(machine) => machine,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => {
                return Ok(ReconcileAction::Complete);
            }
            Err(err) => return Err(err),
        };

        if !machine.metadata.is_tearing_down() {
            if !machine.metadata.has_finalizer(TEARDOWN_FINALIZER) {
                self.store
                    .update_with_conflicts::<ClusterMachineSpec>(&machine_ref, 3, |_s, meta| {
                        meta.add_finalizer(TEARDOWN_FINALIZER);
                    })
                    .await?;
            }
            return Ok(ReconcileAction::Complete);
        }

        if !machine.metadata.has_finalizer(TEARDOWN_FINALIZER) {
            return Ok(ReconcileAction::Complete);
        }

        let nodename = machine_ref.id.0.as_str();
        let drain = self.drainer.cordon_and_drain(nodename).await;
        if drain == DrainOutcome::ApiUnreachable {
            warn!(nodename, "kubernetes api unreachable, proceeding with teardown anyway");
        }

        if matches!(machine.spec.role, MachineSetRole::ControlPlane) {
            let removal = self.drainer.remove_etcd_member(nodename).await;
            if removal == DrainOutcome::ApiUnreachable {
                warn!(nodename, "etcd member removal skipped, api unreachable");
            }
        }

        self.store
            .update_with_conflicts::<ClusterMachineSpec>(&machine_ref, 3, |_s, meta| {
                meta.remove_finalizer(TEARDOWN_FINALIZER);
            })
            .await?;

        Ok(ReconcileAction::Complete)
    }
}

/// Held until drain/etcd-removal has been attempted at least once (spec
/// §4.3: "a teardown controller that ... then removes the finalizer").
const TEARDOWN_FINALIZER: &str = "domain-controllers/cluster-machine-drain";

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use resource_store::backend::memory::MemoryBackend;
    use resource_store::{Namespace, Resource};

    use super::*;

    struct FakeDrainer {
        api_unreachable: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NodeDrainer for FakeDrainer {
        async fn cordon_and_drain(&self, nodename: &str) -> DrainOutcome {
            self.calls.lock().unwrap().push(format!("drain:{nodename}"));
            if self.api_unreachable { DrainOutcome::ApiUnreachable } else { DrainOutcome::Completed }
        }

        async fn remove_etcd_member(&self, nodename: &str) -> DrainOutcome {
            self.calls.lock().unwrap().push(format!("etcd:{nodename}"));
            if self.api_unreachable { DrainOutcome::ApiUnreachable } else { DrainOutcome::Completed }
        }
    }

    #[tokio::test]
    async fn teardown_removes_finalizer_even_when_api_unreachable() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let drainer = Arc::new(FakeDrainer { api_unreachable: true, calls: Mutex::new(Vec::new()) });
        let controller = ClusterMachineController::new(store.clone(), drainer.clone());

        let ns = Namespace::from("default");
        let created = store
            .create(&ns, "m1", ClusterMachineSpec { cluster_id: "c1".into(), machine_set_id: "ms1".into(), role: MachineSetRole::ControlPlane })
            .await
            .unwrap();
        let reference = created.metadata.reference();

        controller.reconcile(&reference).await.unwrap();
        store.teardown(&reference).await.unwrap();
        controller.reconcile(&reference).await.unwrap();

        let after: Resource<ClusterMachineSpec> = store.get(&reference).await.unwrap();
        assert!(after.metadata.finalizers.is_empty());
        assert_eq!(drainer.calls.lock().unwrap().len(), 2);
    }
}
