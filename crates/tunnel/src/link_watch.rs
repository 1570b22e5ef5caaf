//! Bridges `Link` lifecycle events from the store into [`SessionRegistry`]
//! teardown, so destroying a `Link` always closes its tunnel session even
//! if nothing else in the process does (spec §8 scenario 6).

use std::sync::Arc;

use domain_controllers::types::LinkSpec;
use resource_store::{Labels, Namespace, Spec, Store, WatchEvent, WatchOptions};
use tracing::debug;

use crate::registry::SessionRegistry;

/// Runs until the underlying watch closes, closing the matching session for
/// every `Link` destroy event observed. Intended to be spawned as its own
/// task for the lifetime of the process.
pub async fn drive_session_teardown_on_link_destroy(
    store: Arc<Store>,
    namespace: Namespace,
    registry: Arc<SessionRegistry>,
) -> resource_store::Result<()> {
    let mut events = store
        .watch_kind(&namespace, &LinkSpec::TYPE.into(), Labels::new(), WatchOptions::default())
        .await?;

    while let Some(event) = events.recv().await {
        if let WatchEvent::Destroyed(raw) = event {
            let machine_id = raw.metadata.id.0.clone();
            debug!(machine_id, "closing tunnel session for destroyed link");
            registry.close(&machine_id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use resource_store::backend::memory::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn destroying_a_link_closes_its_session() {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let ns = Namespace::default_ns();
        store.create(&ns, "machine-1", LinkSpec { machine_id: "machine-1".into(), connected_at: 0 }).await.unwrap();

        let registry = Arc::new(SessionRegistry::new());
        let (session, _endpoints) = registry.open("machine-1");

        let watch_store = store.clone();
        let watch_ns = ns.clone();
        let watch_registry = registry.clone();
        let task = tokio::spawn(async move {
            drive_session_teardown_on_link_destroy(watch_store, watch_ns, watch_registry).await
        });

        let link_ref = resource_store::ResourceRef::new(ns, LinkSpec::TYPE, "machine-1");
        store.destroy(&link_ref).await.unwrap();

        for _ in 0..100 {
            if session.is_closed() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(session.is_closed());
        task.abort();
    }
}
