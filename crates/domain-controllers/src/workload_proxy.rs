//! Workload Proxy (spec §4.9): projects annotated Kubernetes `Service`
//! objects into `ExposedService` resources routable through `*.proxy.<domain>`.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result, Spec as _, Store};
use sha2::{Digest, Sha256};
use tracing::instrument;

use crate::types::{labels, ExposedServiceSpec};

pub const PORT_ANNOTATION: &str = "omni-kube-service-exposer.sidero.dev/port";
pub const LABEL_ANNOTATION: &str = "omni-kube-service-exposer.sidero.dev/label";
pub const ICON_ANNOTATION: &str = "omni-kube-service-exposer.sidero.dev/icon";
pub const PREFIX_ANNOTATION: &str = "omni-kube-service-exposer.sidero.dev/prefix";

/// The subset of a watched Kubernetes `Service` the proxy controller needs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchedService {
    pub cluster_id: String,
    pub namespace: String,
    pub name: String,
    pub port: u16,
    pub label: Option<String>,
    pub icon_base64: Option<String>,
    pub explicit_alias: Option<String>,
}

/// Derives the alias segment of the proxy URL: the explicit `/prefix`
/// annotation if present, else a deterministic short hash of
/// `(cluster, namespace, service)` (spec §4.9).
pub fn derive_alias(service: &WatchedService) -> (String, bool) {
    match &service.explicit_alias {
        Some(alias) => (alias.clone(), true),
        None => {
            let digest = Sha256::digest(format!("{}/{}/{}", service.cluster_id, service.namespace, service.name).as_bytes());
            (hex::encode(digest)[..12].to_owned(), false)
        }
    }
}

/// Builds the full proxy URL for a service: `https://<alias>-<hash>.proxy.<domain>/`.
pub fn proxy_url(domain: &str, service: &WatchedService) -> String {
    let digest = Sha256::digest(format!("{}/{}/{}", service.cluster_id, service.namespace, service.name).as_bytes());
    let hash = hex::encode(digest);
    let (alias, _explicit) = derive_alias(service);
    format!("https://{alias}-{short_hash}.proxy.{domain}/", short_hash = &hash[..8])
}

pub struct WorkloadProxyController {
    store: Arc<Store>,
    domain: String,
    services: Arc<dyn ServiceLister>,
}

/// Enumerates annotated `Service` objects in a workload cluster. Kept as a
/// trait so this controller never depends on a Kubernetes client crate
/// directly.
#[async_trait]
pub trait ServiceLister: Send + Sync {
    async fn list_annotated_services(&self, cluster_id: &str) -> Result<Vec<WatchedService>>;
}

impl WorkloadProxyController {
    pub fn new(store: Arc<Store>, domain: impl Into<String>, services: Arc<dyn ServiceLister>) -> Self {
        Self { store, domain: domain.into(), services }
    }
}

#[async_trait]
impl Controller for WorkloadProxyController {
    fn name(&self) -> &str {
        "workload-proxy"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::exclusive(ExposedServiceSpec::TYPE)]
    }

    #[instrument(name = "reconcile_workload_proxy", skip(self), fields(cluster = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let cluster_id = trigger.id.0.as_str();
        let services = self.services.list_annotated_services(cluster_id).await?;

        let mut live_ids = BTreeSet::new();
        for service in &services {
            let url = proxy_url(&self.domain, service);
            let (_, has_explicit_alias) = derive_alias(service);
            let spec = ExposedServiceSpec {
                url,
                port: service.port,
                label: service.label.clone(),
                icon_base64: service.icon_base64.clone(),
                has_explicit_alias,
            };
            let id = format!("{}-{}-{}", cluster_id, service.namespace, service.name);
            live_ids.insert(id.clone());
            let reference = ResourceRef::new(trigger.namespace.clone(), ExposedServiceSpec::TYPE, id.clone());
            match self.store.get::<ExposedServiceSpec>(&reference).await {
                Ok(_) => {
                    self.store
                        .update_with_conflicts::<ExposedServiceSpec>(&reference, 3, |s, _m| *s = spec.clone())
                        .await?;
                }
                Err(_) => {
                    let created = self.store.create(&trigger.namespace, id, spec).await?;
                    self.store
                        .update_with_conflicts::<ExposedServiceSpec>(&created.metadata.reference(), 3, |_s, meta| {
                            meta.labels.insert(labels::CLUSTER_ID.to_owned(), cluster_id.to_owned());
                        })
                        .await?;
                }
            }
        }

        self.destroy_stale(trigger, cluster_id, &live_ids).await?;

        Ok(ReconcileAction::Requeue(std::time::Duration::from_secs(30)))
    }
}

impl WorkloadProxyController {
    /// Destroys any `ExposedService` labeled with `cluster_id` that isn't in
    /// `live_ids` -- its annotation was removed, or its `Service` is gone
    /// (spec §4.9: "Removing the annotation destroys the ExposedService").
    async fn destroy_stale(&self, trigger: &ResourceRef, cluster_id: &str, live_ids: &BTreeSet<String>) -> Result<()> {
        let existing: Vec<Resource<ExposedServiceSpec>> = self
            .store
            .list(&trigger.namespace, &LabelQuery::new().equals(labels::CLUSTER_ID, cluster_id))
            .await?;

        for exposed in existing {
            if live_ids.contains(exposed.metadata.id.0.as_str()) {
                continue;
            }
            let reference = exposed.metadata.reference();
            if !exposed.metadata.is_tearing_down() {
                self.store.teardown(&reference).await?;
            }
            self.store.destroy(&reference).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(alias: Option<&str>) -> WatchedService {
        WatchedService {
            cluster_id: "c1".into(),
            namespace: "default".into(),
            name: "grafana".into(),
            port: 3000,
            label: Some("Grafana".into()),
            icon_base64: None,
            explicit_alias: alias.map(str::to_owned),
        }
    }

    #[test]
    fn explicit_prefix_is_used_as_alias() {
        let (alias, explicit) = derive_alias(&service(Some("dashboards")));
        assert_eq!(alias, "dashboards");
        assert!(explicit);
    }

    #[test]
    fn missing_prefix_derives_a_deterministic_hash_alias() {
        let (alias_a, explicit_a) = derive_alias(&service(None));
        let (alias_b, _) = derive_alias(&service(None));
        assert_eq!(alias_a, alias_b);
        assert!(!explicit_a);
    }

    #[test]
    fn proxy_url_is_stable_for_the_same_service() {
        let url_a = proxy_url("example.com", &service(None));
        let url_b = proxy_url("example.com", &service(None));
        assert_eq!(url_a, url_b);
        assert!(url_a.starts_with("https://"));
        assert!(url_a.ends_with(".proxy.example.com/"));
    }

    struct FakeLister {
        services: std::sync::Mutex<Vec<WatchedService>>,
    }

    #[async_trait]
    impl ServiceLister for FakeLister {
        async fn list_annotated_services(&self, cluster_id: &str) -> Result<Vec<WatchedService>> {
            Ok(self.services.lock().unwrap().iter().filter(|s| s.cluster_id == cluster_id).cloned().collect())
        }
    }

    #[tokio::test]
    async fn removing_the_annotation_destroys_the_exposed_service() {
        use resource_store::backend::memory::MemoryBackend;
        use resource_store::Namespace;

        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let lister = Arc::new(FakeLister { services: std::sync::Mutex::new(vec![service(None)]) });
        let controller = WorkloadProxyController::new(store.clone(), "example.com", lister.clone());
        let ns = Namespace::from("default");
        let trigger = ResourceRef::new(ns.clone(), crate::types::ClusterSpec::TYPE, "c1");

        controller.reconcile(&trigger).await.unwrap();
        let id = "c1-default-grafana";
        let reference = ResourceRef::new(ns.clone(), ExposedServiceSpec::TYPE, id);
        store.get::<ExposedServiceSpec>(&reference).await.unwrap();

        // The Service's annotation (or the Service itself) is gone.
        lister.services.lock().unwrap().clear();
        controller.reconcile(&trigger).await.unwrap();

        assert!(store.get::<ExposedServiceSpec>(&reference).await.is_err());
    }
}
