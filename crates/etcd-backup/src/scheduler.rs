//! Etcd snapshot scheduling (spec §4.5): a per-cluster backup every
//! `BackupConfiguration.IntervalSeconds` while enabled, plus an immediate
//! backup whenever an `EtcdManualBackup` is created. Both paths converge on
//! the same upload-then-record sequence so status reflects either trigger
//! uniformly.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{LabelQuery, Resource, ResourceRef, Result as StoreResult, Spec as _, Store};
use tracing::{info, instrument, warn};

use crate::object_store::ObjectStore;
use crate::types::{
    BackupHealth, EtcdBackupOverallStatusSpec, EtcdBackupSpec, EtcdBackupStatusSpec, EtcdManualBackupSpec,
};

/// A minimal stand-in for the part of `ClusterSpec` this crate needs, kept
/// local so `etcd-backup` doesn't depend on `domain-controllers` for a
/// two-field read (the reverse dependency would be the wrong direction:
/// `domain-controllers` already depends on `config-render`, and nothing
/// should depend back on it).
#[derive(Clone, Debug, serde::Deserialize)]
struct ClusterBackupView {
    #[serde(default)]
    backup_configuration: Option<BackupConfigurationView>,
}

#[derive(Clone, Debug, serde::Deserialize)]
struct BackupConfigurationView {
    enabled: bool,
    interval_seconds: u64,
}

impl resource_store::Spec for ClusterBackupView {
    const TYPE: &'static str = "Clusters.omni.sidero.dev";
}

/// Produces a fresh etcd snapshot for a cluster. Kept as a trait so the
/// scheduler is exercised in tests without a live etcd member.
#[async_trait]
pub trait EtcdSnapshotter: Send + Sync {
    async fn snapshot(&self, cluster_id: &str) -> crate::error::Result<Vec<u8>>;
}

const DEFAULT_BACKUP_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub struct EtcdBackupScheduler {
    store: Arc<Store>,
    objects: Arc<dyn ObjectStore>,
    snapshotter: Arc<dyn EtcdSnapshotter>,
}

impl EtcdBackupScheduler {
    pub fn new(store: Arc<Store>, objects: Arc<dyn ObjectStore>, snapshotter: Arc<dyn EtcdSnapshotter>) -> Self {
        Self { store, objects, snapshotter }
    }

    async fn run_backup(&self, namespace: &resource_store::Namespace, cluster_id: &str) -> StoreResult<()> {
        let now = current_unix_seconds();
        let outcome = self.take_and_upload(namespace, cluster_id, now).await;

        let status_ref = ResourceRef::new(namespace.clone(), EtcdBackupStatusSpec::TYPE, cluster_id);
        let (status, error_message) = match &outcome {
            Ok(()) => (
                EtcdBackupStatusSpec {
                    status: BackupHealth::Ok,
                    last_backup_time: Some(now),
                    last_backup_attempt: Some(now),
                    error: None,
                },
                None,
            ),
            Err(err) => {
                warn!(cluster_id, error = %err, "etcd backup failed");
                (
                    EtcdBackupStatusSpec {
                        status: BackupHealth::Error,
                        last_backup_time: None,
                        last_backup_attempt: Some(now),
                        error: Some(err.to_string()),
                    },
                    Some(err.to_string()),
                )
            }
        };
        let _ = error_message;

        if self.store.get::<EtcdBackupStatusSpec>(&status_ref).await.is_ok() {
            self.store
                .update_with_conflicts::<EtcdBackupStatusSpec>(&status_ref, 3, move |spec, _meta| *spec = status.clone())
                .await?;
        } else {
            self.store.create(namespace, cluster_id, status).await?;
        }

        self.refresh_overall_status(namespace).await?;
        outcome.map_err(to_store_error)
    }

    async fn take_and_upload(&self, namespace: &resource_store::Namespace, cluster_id: &str, now: u64) -> crate::error::Result<()> {
        let snapshot = self.snapshotter.snapshot(cluster_id).await?;
        let key = format!("{cluster_id}/{now}.snapshot");
        self.objects.put(&key, snapshot).await?;

        let record = EtcdBackupSpec { cluster_id: cluster_id.to_owned(), snapshot_key: key, taken_at: now };
        self.store.create(namespace, now.to_string(), record).await.map_err(crate::error::Error::from)?;
        info!(cluster_id, taken_at = now, "uploaded etcd snapshot");
        Ok(())
    }

    async fn refresh_overall_status(&self, namespace: &resource_store::Namespace) -> StoreResult<()> {
        let statuses: Vec<Resource<EtcdBackupStatusSpec>> = self.store.list(namespace, &LabelQuery::new()).await?;
        let clusters_ok = statuses.iter().filter(|s| s.spec.status == BackupHealth::Ok).count() as u32;
        let clusters_erroring = statuses.iter().filter(|s| s.spec.status == BackupHealth::Error).count() as u32;
        let overall = EtcdBackupOverallStatusSpec { clusters_ok, clusters_erroring };

        let reference = ResourceRef::new(namespace.clone(), EtcdBackupOverallStatusSpec::TYPE, "overall");
        if self.store.get::<EtcdBackupOverallStatusSpec>(&reference).await.is_ok() {
            self.store
                .update_with_conflicts::<EtcdBackupOverallStatusSpec>(&reference, 3, move |spec, _meta| *spec = overall.clone())
                .await?;
        } else {
            self.store.create(namespace, "overall", overall).await?;
        }
        Ok(())
    }

    async fn reconcile_cluster(&self, trigger: &ResourceRef) -> StoreResult<ReconcileAction> {
        let cluster_ref = ResourceRef::new(trigger.namespace.clone(), ClusterBackupView::TYPE, trigger.id.clone());
        let cluster: Resource<ClusterBackupView> = match self.store.get(&cluster_ref).await {
            Ok(cluster) => cluster,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => return Ok(ReconcileAction::Complete),
            Err(err) => return Err(err),
        };

        let Some(config) = &cluster.spec.backup_configuration else {
            return Ok(ReconcileAction::Complete);
        };
        if !config.enabled {
            return Ok(ReconcileAction::Complete);
        }

        let cluster_id = trigger.id.0.as_str();
        let due = self.is_backup_due(&trigger.namespace, cluster_id, config.interval_seconds).await?;
        if due {
            self.run_backup(&trigger.namespace, cluster_id).await?;
        }

        let interval = Duration::from_secs(config.interval_seconds.max(1)).min(DEFAULT_BACKUP_CHECK_INTERVAL).max(Duration::from_secs(1));
        Ok(ReconcileAction::Requeue(interval))
    }

    async fn is_backup_due(&self, namespace: &resource_store::Namespace, cluster_id: &str, interval_seconds: u64) -> StoreResult<bool> {
        let status_ref = ResourceRef::new(namespace.clone(), EtcdBackupStatusSpec::TYPE, cluster_id);
        let last = match self.store.get::<EtcdBackupStatusSpec>(&status_ref).await {
            Ok(status) => status.spec.last_backup_time,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };
        Ok(match last {
            Some(last) => current_unix_seconds().saturating_sub(last) >= interval_seconds,
            None => true,
        })
    }

    async fn reconcile_manual(&self, trigger: &ResourceRef) -> StoreResult<ReconcileAction> {
        let manual: Resource<EtcdManualBackupSpec> = match self.store.get(trigger).await {
            Ok(manual) => manual,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => return Ok(ReconcileAction::Complete),
            Err(err) => return Err(err),
        };
        self.run_backup(&trigger.namespace, &manual.spec.cluster_id).await?;
        self.store.teardown(trigger).await?;
        self.store.destroy(trigger).await?;
        Ok(ReconcileAction::Complete)
    }
}

#[async_trait]
impl Controller for EtcdBackupScheduler {
    fn name(&self) -> &str {
        "etcd-backup-scheduler"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![InputDecl::strong(ClusterBackupView::TYPE), InputDecl::strong(EtcdManualBackupSpec::TYPE)]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![
            OutputDecl::exclusive(EtcdBackupSpec::TYPE),
            OutputDecl::exclusive(EtcdBackupStatusSpec::TYPE),
            OutputDecl::exclusive(EtcdBackupOverallStatusSpec::TYPE),
        ]
    }

    #[instrument(name = "reconcile_etcd_backup", skip(self), fields(resource = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> StoreResult<ReconcileAction> {
        if trigger.type_name.0 == EtcdManualBackupSpec::TYPE {
            self.reconcile_manual(trigger).await
        } else {
            self.reconcile_cluster(trigger).await
        }
    }
}

fn to_store_error(err: crate::error::Error) -> resource_store::Error {
    resource_store::error::BackendSnafu { message: err.to_string() }.build()
}

fn current_unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use resource_store::backend::memory::MemoryBackend;
    use resource_store::Namespace;

    use super::*;
    use crate::object_store::MemoryObjectStore;

    struct FakeSnapshotter;

    #[async_trait]
    impl EtcdSnapshotter for FakeSnapshotter {
        async fn snapshot(&self, _cluster_id: &str) -> crate::error::Result<Vec<u8>> {
            Ok(b"fake-snapshot".to_vec())
        }
    }

    #[tokio::test]
    async fn manual_backup_uploads_and_records_status() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let objects = Arc::new(MemoryObjectStore::new());
        let scheduler = EtcdBackupScheduler::new(store.clone(), objects.clone(), Arc::new(FakeSnapshotter));

        let ns = Namespace::from("default");
        let manual_ref = store
            .create(&ns, "manual-1", EtcdManualBackupSpec { cluster_id: "c1".into(), backup_at: 0 })
            .await
            .unwrap()
            .metadata
            .reference();

        let action = scheduler.reconcile(&manual_ref).await.unwrap();
        assert_eq!(action, ReconcileAction::Complete);

        let status: Resource<EtcdBackupStatusSpec> =
            store.get(&ResourceRef::new(ns.clone(), EtcdBackupStatusSpec::TYPE, "c1")).await.unwrap();
        assert_eq!(status.spec.status, BackupHealth::Ok);
        assert!(status.spec.last_backup_time.is_some());

        assert!(store.get::<EtcdManualBackupSpec>(&manual_ref).await.is_err());
    }

    #[tokio::test]
    async fn cluster_without_backup_configuration_is_skipped() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let objects = Arc::new(MemoryObjectStore::new());
        let scheduler = EtcdBackupScheduler::new(store.clone(), objects, Arc::new(FakeSnapshotter));

        let ns = Namespace::from("default");
        store.create(&ns, "c1", ClusterBackupView { backup_configuration: None }).await.unwrap();

        let trigger = ResourceRef::new(ns.clone(), ClusterBackupView::TYPE, "c1");
        let action = scheduler.reconcile(&trigger).await.unwrap();
        assert_eq!(action, ReconcileAction::Complete);

        assert!(store.get::<EtcdBackupStatusSpec>(&ResourceRef::new(ns, EtcdBackupStatusSpec::TYPE, "c1")).await.is_err());
    }
}
