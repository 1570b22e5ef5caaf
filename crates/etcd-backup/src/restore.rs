//! Restore path (spec §4.5): given a source cluster ID, resolve its
//! most-recent `EtcdBackup` and fetch the snapshot bytes back out of
//! [`ObjectStore`]. `domain_controllers::cluster` resolves the same
//! "most-recent backup" query independently (see its `EtcdBackupMirror`) to
//! populate `ClusterStatus.restored_snapshot_key` without a dependency edge
//! back onto this crate; this module is the production counterpart that
//! actually performs the download once a snapshot key has been chosen.

use std::sync::Arc;

use resource_store::{LabelQuery, Resource, Store};

use crate::error::{Error, Result};
use crate::object_store::ObjectStore;
use crate::types::EtcdBackupSpec;

/// The most recent `EtcdBackup` record for `cluster_id`, or `None` if it has
/// never been backed up. Listing is newest-first by unix-second timestamp
/// ID (spec §4.5), so this is the maximum `taken_at` among matches.
pub async fn latest_backup(store: &Store, namespace: &resource_store::Namespace, cluster_id: &str) -> resource_store::Result<Option<Resource<EtcdBackupSpec>>> {
    let backups: Vec<Resource<EtcdBackupSpec>> = store.list(namespace, &LabelQuery::new()).await?;
    Ok(backups.into_iter().filter(|backup| backup.spec.cluster_id == cluster_id).max_by_key(|backup| backup.spec.taken_at))
}

/// Downloads the snapshot bytes for `source_cluster_id`'s most recent
/// backup. Used to seed a restoring cluster's first control-plane member
/// (spec §4.5: "binds this cluster to an existing cluster's most-recent
/// etcd snapshot").
pub async fn restore_latest(
    store: &Store,
    objects: &Arc<dyn ObjectStore>,
    namespace: &resource_store::Namespace,
    source_cluster_id: &str,
) -> Result<Vec<u8>> {
    let backup = latest_backup(store, namespace, source_cluster_id)
        .await?
        .ok_or_else(|| Error::NoBackupFound { cluster_id: source_cluster_id.to_owned() })?;
    objects.get(&backup.spec.snapshot_key).await
}

#[cfg(test)]
mod tests {
    use resource_store::backend::memory::MemoryBackend;
    use resource_store::Namespace;

    use super::*;
    use crate::object_store::MemoryObjectStore;

    #[tokio::test]
    async fn restore_latest_fetches_the_newest_snapshot_among_several() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let ns = Namespace::from("default");

        objects.put("source/100.snapshot", b"old".to_vec()).await.unwrap();
        objects.put("source/200.snapshot", b"new".to_vec()).await.unwrap();
        store.create(&ns, "100", EtcdBackupSpec { cluster_id: "source".into(), snapshot_key: "source/100.snapshot".into(), taken_at: 100 }).await.unwrap();
        store.create(&ns, "200", EtcdBackupSpec { cluster_id: "source".into(), snapshot_key: "source/200.snapshot".into(), taken_at: 200 }).await.unwrap();

        let bytes = restore_latest(&store, &objects, &ns, "source").await.unwrap();
        assert_eq!(bytes, b"new");
    }

    #[tokio::test]
    async fn restore_latest_fails_when_source_has_no_backup() {
        let store = Store::new(Arc::new(MemoryBackend::new()));
        let objects: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());
        let ns = Namespace::from("default");

        let err = restore_latest(&store, &objects, &ns, "never-backed-up").await.unwrap_err();
        assert!(matches!(err, Error::NoBackupFound { .. }));
    }
}
