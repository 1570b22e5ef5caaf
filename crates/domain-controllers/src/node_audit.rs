//! Kubernetes Node Audit (spec §4.8): reconciles stale Kubernetes nodes left
//! behind when a `ClusterMachine` was force-destroyed while the API server
//! was unreachable.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Store};
use tracing::{info, instrument};

use crate::types::{labels, ClusterMachineIdentitySpec};

/// Enumerates node names known to a cluster's Kubernetes API. Kept as a
/// trait so the controller can be exercised without a live cluster.
#[async_trait]
pub trait KubernetesNodeLister: Send + Sync {
    async fn list_node_names(&self, cluster_id: &str) -> Result<BTreeSet<String>>;
    async fn delete_node(&self, cluster_id: &str, nodename: &str) -> Result<()>;
}

/// How many consecutive audit passes a node must be observed as orphaned
/// before it is deleted, to absorb transient staleness in the Omni-side
/// view (spec §4.8: "persistently so, across debounce").
const DEBOUNCE_PASSES: u32 = 3;

pub struct NodeAuditController {
    store: Arc<Store>,
    lister: Arc<dyn KubernetesNodeLister>,
    orphan_counts: tokio::sync::Mutex<std::collections::HashMap<(String, String), u32>>,
}

impl NodeAuditController {
    pub fn new(store: Arc<Store>, lister: Arc<dyn KubernetesNodeLister>) -> Self {
        Self { store, lister, orphan_counts: tokio::sync::Mutex::new(std::collections::HashMap::new()) }
    }

    async fn audit_cluster(&self, namespace: &resource_store::Namespace, cluster_id: &str) -> Result<()> {
        let known_nodes = self.lister.list_node_names(cluster_id).await?;

        let identities: Vec<Resource<ClusterMachineIdentitySpec>> = self
            .store
            .list(namespace, &LabelQuery::new().equals(labels::CLUSTER_ID, cluster_id))
            .await?;
        let live_nodenames: BTreeSet<&str> = identities.iter().map(|i| i.spec.nodename.as_str()).collect();

        let orphans: Vec<&str> = known_nodes.iter().map(String::as_str).filter(|n| !live_nodenames.contains(n)).collect();

        let mut counts = self.orphan_counts.lock().await;
        // A node that is no longer orphaned (became known, or was already
        // deleted) resets its debounce count.
        counts.retain(|(c, n), _| c != cluster_id || orphans.contains(&n.as_str()));

        for nodename in orphans {
            let key = (cluster_id.to_owned(), nodename.to_owned());
            let count = counts.entry(key.clone()).or_insert(0);
            *count += 1;
            if *count >= DEBOUNCE_PASSES {
                self.lister.delete_node(cluster_id, nodename).await?;
                info!(cluster_id, nodename, "deleted stale kubernetes node");
                counts.remove(&key);
            }
        }

        Ok(())
    }
}

#[async_trait]
impl Controller for NodeAuditController {
    fn name(&self) -> &str {
        "node-audit"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![InputDecl::weak(ClusterMachineIdentitySpec::TYPE)]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![]
    }

    #[instrument(name = "reconcile_node_audit", skip(self), fields(cluster = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        self.audit_cluster(&trigger.namespace, &trigger.id.0).await?;
        Ok(ReconcileAction::Requeue(std::time::Duration::from_secs(60)))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use resource_store::backend::memory::MemoryBackend;
    use resource_store::Namespace;

    use super::*;

    struct FakeLister {
        nodes: BTreeSet<String>,
        deleted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KubernetesNodeLister for FakeLister {
        async fn list_node_names(&self, _cluster_id: &str) -> Result<BTreeSet<String>> {
            Ok(self.nodes.clone())
        }

        async fn delete_node(&self, _cluster_id: &str, nodename: &str) -> Result<()> {
            self.deleted.lock().unwrap().push(nodename.to_owned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn orphaned_node_is_deleted_after_debounce() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let mut nodes = BTreeSet::new();
        nodes.insert("stale-node".to_owned());
        let lister = Arc::new(FakeLister { nodes, deleted: Mutex::new(Vec::new()) });
        let controller = NodeAuditController::new(store, lister.clone());

        let trigger = ResourceRef::new(Namespace::from("default"), ClusterMachineIdentitySpec::TYPE, "c1");
        for _ in 0..DEBOUNCE_PASSES {
            controller.reconcile(&trigger).await.unwrap();
        }

        assert_eq!(lister.deleted.lock().unwrap().as_slice(), ["stale-node"]);
    }

    #[tokio::test]
    async fn live_node_is_never_deleted() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let ns = Namespace::from("default");
        store.create(&ns, "m1", ClusterMachineIdentitySpec { nodename: "live-node".into() }).await.unwrap();
        update_labels(&store, &ns, "m1", "c1").await;

        let mut nodes = BTreeSet::new();
        nodes.insert("live-node".to_owned());
        let lister = Arc::new(FakeLister { nodes, deleted: Mutex::new(Vec::new()) });
        let controller = NodeAuditController::new(store, lister.clone());

        let trigger = ResourceRef::new(ns, ClusterMachineIdentitySpec::TYPE, "c1");
        for _ in 0..(DEBOUNCE_PASSES + 2) {
            controller.reconcile(&trigger).await.unwrap();
        }

        assert!(lister.deleted.lock().unwrap().is_empty());
    }

    async fn update_labels(store: &Store, ns: &Namespace, id: &str, cluster_id: &str) {
        let reference = ResourceRef::new(ns.clone(), ClusterMachineIdentitySpec::TYPE, id);
        store
            .update_with_conflicts::<ClusterMachineIdentitySpec>(&reference, 3, |_s, meta| {
                meta.labels.insert(labels::CLUSTER_ID.to_owned(), cluster_id.to_owned());
            })
            .await
            .unwrap();
    }
}
