//! A per-tenant filtering watch wrapper (spec §9, "narrow a store watch to
//! one tenant's resources without giving that tenant a raw store handle").
//!
//! This wraps an upstream [`WatchEvent`] receiver in a task that applies a
//! predicate and forwards only matching events to a fresh channel, closing
//! the downstream channel as soon as the upstream closes or the predicate
//! task is dropped -- the same shape as the teacher's practice of wrapping
//! a channel in a forwarding task rather than exposing the raw one.

use tokio::sync::mpsc;

use crate::event::WatchEvent;

const FILTERED_CHANNEL_CAPACITY: usize = 1024;

/// Spawns a task that forwards events from `upstream` to the returned
/// receiver, skipping any for which `predicate` returns `false`.
/// [`WatchEvent::Bootstrapped`] and [`WatchEvent::Errored`] are always
/// forwarded, since they carry no resource to filter on.
pub fn filter(
    mut upstream: mpsc::Receiver<WatchEvent>,
    predicate: impl Fn(&WatchEvent) -> bool + Send + 'static,
) -> mpsc::Receiver<WatchEvent> {
    let (tx, rx) = mpsc::channel(FILTERED_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        while let Some(event) = upstream.recv().await {
            let forward = matches!(event, WatchEvent::Bootstrapped | WatchEvent::Errored(_))
                || predicate(&event);
            if forward && tx.send(event).await.is_err() {
                return;
            }
        }
    });
    rx
}

/// Restricts a watch to a single namespace, the shape infra-provider tenant
/// isolation needs (spec §4.6).
pub fn filter_namespace(
    upstream: mpsc::Receiver<WatchEvent>,
    namespace: crate::metadata::Namespace,
) -> mpsc::Receiver<WatchEvent> {
    filter(upstream, move |event| {
        event.reference().is_some_and(|r| r.namespace == namespace)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Id, Metadata, Namespace, ResourceRef, TypeName};
    use crate::raw::RawResource;

    fn raw(namespace: &str) -> RawResource {
        let reference = ResourceRef::new(Namespace::from(namespace), TypeName::from("Widgets"), Id::from("a"));
        RawResource {
            metadata: Metadata::new(reference, 0),
            payload: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn filters_by_namespace() {
        let (tx, rx) = mpsc::channel(8);
        let mut filtered = filter_namespace(rx, Namespace::from("tenant-a"));

        tx.send(WatchEvent::Created(raw("tenant-a"))).await.unwrap();
        tx.send(WatchEvent::Created(raw("tenant-b"))).await.unwrap();
        tx.send(WatchEvent::Bootstrapped).await.unwrap();
        drop(tx);

        let first = filtered.recv().await.unwrap();
        assert!(matches!(first, WatchEvent::Created(r) if r.metadata.namespace.0 == "tenant-a"));

        let second = filtered.recv().await.unwrap();
        assert!(matches!(second, WatchEvent::Bootstrapped));

        assert!(filtered.recv().await.is_none());
    }
}
