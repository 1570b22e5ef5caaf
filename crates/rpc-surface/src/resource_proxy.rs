//! The dispatch target of the middleware pipeline: a generic Resource RPC
//! surface (`Get`/`List`/`Watch`/`Create`/`Update`/`Destroy`/`Teardown`,
//! spec §6) addressed by a runtime `TypeName` rather than a compile-time
//! `Spec`, plus the infra-provider tenant-scoping decorator from spec §4.6.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use resource_store::{
    Labels, Namespace, RawResource, ResourceRef, Result as StoreResult, Store, TypeName, Version, WatchEvent,
    WatchOptions,
};
use resource_store::selector::LabelQuery;

/// The generic CRUD+Watch surface a signed request ultimately dispatches
/// to, once the middleware pipeline has authorized it (spec §2 "Validated/
/// Wrapped Store Layers", spec §6 "Resource" service).
#[async_trait]
pub trait ResourceProxy: Send + Sync {
    async fn get(&self, reference: &ResourceRef) -> StoreResult<RawResource>;

    async fn list(&self, namespace: &Namespace, type_name: &TypeName, query: &LabelQuery) -> StoreResult<Vec<RawResource>>;

    async fn create(&self, reference: ResourceRef, payload: serde_json::Value, labels: Labels) -> StoreResult<RawResource>;

    async fn update(
        &self,
        reference: &ResourceRef,
        expected_version: Version,
        payload: serde_json::Value,
    ) -> StoreResult<RawResource>;

    async fn teardown(&self, reference: &ResourceRef) -> StoreResult<()>;

    async fn destroy(&self, reference: &ResourceRef) -> StoreResult<()>;

    async fn watch_kind(
        &self,
        namespace: &Namespace,
        type_name: &TypeName,
        labels: Labels,
        options: WatchOptions,
    ) -> StoreResult<mpsc::Receiver<WatchEvent>>;
}

/// The production `ResourceProxy`: a thin, un-scoped pass-through to a
/// single in-process [`Store`]. Tenant scoping is layered on top by
/// [`TenantScopedProxy`], not built in here, the same way `auth`'s
/// decision functions sit in front of the store rather than inside it.
pub struct InProcessResourceProxy {
    store: Arc<Store>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl InProcessResourceProxy {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            clock: Arc::new(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            }),
        }
    }
}

#[async_trait]
impl ResourceProxy for InProcessResourceProxy {
    async fn get(&self, reference: &ResourceRef) -> StoreResult<RawResource> {
        self.store.get_raw(reference).await
    }

    async fn list(&self, namespace: &Namespace, type_name: &TypeName, query: &LabelQuery) -> StoreResult<Vec<RawResource>> {
        self.store.list_raw(namespace, type_name, query).await
    }

    async fn create(&self, reference: ResourceRef, payload: serde_json::Value, labels: Labels) -> StoreResult<RawResource> {
        self.store.create_raw(reference, payload, labels, (self.clock)()).await
    }

    async fn update(
        &self,
        reference: &ResourceRef,
        expected_version: Version,
        payload: serde_json::Value,
    ) -> StoreResult<RawResource> {
        self.store
            .update_raw(reference, expected_version, |raw| raw.payload = payload)
            .await
    }

    async fn teardown(&self, reference: &ResourceRef) -> StoreResult<()> {
        self.store.teardown(reference).await
    }

    async fn destroy(&self, reference: &ResourceRef) -> StoreResult<()> {
        self.store.destroy(reference).await
    }

    async fn watch_kind(
        &self,
        namespace: &Namespace,
        type_name: &TypeName,
        labels: Labels,
        options: WatchOptions,
    ) -> StoreResult<mpsc::Receiver<WatchEvent>> {
        self.store.watch_kind(namespace, type_name, labels, options).await
    }
}

/// Wraps any [`ResourceProxy`] with infra-provider tenant isolation (spec
/// §4.6): a scoped caller's `get`/`list` see only resources carrying its own
/// `infra-provider-id` label (others read back as `NotFound`, never
/// `PermissionDenied` -- spec §4.6 "others are filtered out as not-found").
/// `create`/`update` are left to the caller to pre-authorize via
/// `auth::tenant` (the check needs the proposed payload and, for updates,
/// the stored spec, neither of which this decorator alone can diff) --
/// this proxy only enforces the *visibility* half of isolation, mirroring
/// how `auth::tenant::authorize_create`/`authorize_update_spec_unchanged`
/// are the call-site checks for the *mutation* half.
pub struct TenantScopedProxy<P> {
    inner: P,
    provider_id: String,
}

impl<P: ResourceProxy> TenantScopedProxy<P> {
    pub fn new(inner: P, provider_id: impl Into<String>) -> Self {
        Self { inner, provider_id: provider_id.into() }
    }
}

#[async_trait]
impl<P: ResourceProxy> ResourceProxy for TenantScopedProxy<P> {
    async fn get(&self, reference: &ResourceRef) -> StoreResult<RawResource> {
        let raw = self.inner.get(reference).await?;
        if auth::tenant::visible_to_provider(&self.provider_id, &raw.metadata.labels) {
            Ok(raw)
        } else {
            resource_store::error::NotFoundSnafu { reference: reference.clone() }.fail()
        }
    }

    async fn list(&self, namespace: &Namespace, type_name: &TypeName, query: &LabelQuery) -> StoreResult<Vec<RawResource>> {
        let raws = self.inner.list(namespace, type_name, query).await?;
        Ok(raws
            .into_iter()
            .filter(|r| auth::tenant::visible_to_provider(&self.provider_id, &r.metadata.labels))
            .collect())
    }

    async fn create(&self, reference: ResourceRef, payload: serde_json::Value, labels: Labels) -> StoreResult<RawResource> {
        self.inner.create(reference, payload, labels).await
    }

    async fn update(
        &self,
        reference: &ResourceRef,
        expected_version: Version,
        payload: serde_json::Value,
    ) -> StoreResult<RawResource> {
        self.inner.update(reference, expected_version, payload).await
    }

    async fn teardown(&self, reference: &ResourceRef) -> StoreResult<()> {
        self.inner.teardown(reference).await
    }

    async fn destroy(&self, reference: &ResourceRef) -> StoreResult<()> {
        let raw = self.inner.get(reference).await?;
        if !auth::tenant::visible_to_provider(&self.provider_id, &raw.metadata.labels) {
            return resource_store::error::NotFoundSnafu { reference: reference.clone() }.fail();
        }
        self.inner.destroy(reference).await
    }

    async fn watch_kind(
        &self,
        namespace: &Namespace,
        type_name: &TypeName,
        labels: Labels,
        options: WatchOptions,
    ) -> StoreResult<mpsc::Receiver<WatchEvent>> {
        let upstream = self.inner.watch_kind(namespace, type_name, labels, options).await?;
        let provider_id = self.provider_id.clone();
        Ok(resource_store::watch::filter(upstream, move |event| match event {
            WatchEvent::Created(r) | WatchEvent::Destroyed(r) => auth::tenant::visible_to_provider(&provider_id, &r.metadata.labels),
            WatchEvent::Updated { new, .. } => auth::tenant::visible_to_provider(&provider_id, &new.metadata.labels),
            WatchEvent::Bootstrapped | WatchEvent::Errored(_) => true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use resource_store::backend::memory::MemoryBackend;

    use super::*;

    fn proxy() -> InProcessResourceProxy {
        InProcessResourceProxy::new(Arc::new(Store::new(Arc::new(MemoryBackend::new()))))
    }

    #[tokio::test]
    async fn in_process_proxy_round_trips_raw_payloads() {
        let proxy = proxy();
        let reference = ResourceRef::new(Namespace::from("default"), "Widgets", "w1");
        proxy
            .create(reference.clone(), serde_json::json!({"color": "red"}), Labels::new())
            .await
            .unwrap();

        let fetched = proxy.get(&reference).await.unwrap();
        assert_eq!(fetched.payload["color"], "red");
    }

    #[tokio::test]
    async fn tenant_scoped_proxy_hides_other_providers_resources_as_not_found() {
        let inner = proxy();
        let reference = ResourceRef::new(Namespace::from("default"), "MachineRequests.omni.sidero.dev", "m1");
        let mut labels = Labels::new();
        labels.insert(auth::tenant::INFRA_PROVIDER_ID_LABEL.to_owned(), "qemu-1".to_owned());
        inner.create(reference.clone(), serde_json::json!({}), labels).await.unwrap();

        let scoped_owner = TenantScopedProxy::new(
            InProcessResourceProxy::new(inner_store_handle(&inner)),
            "qemu-1",
        );
        assert!(scoped_owner.get(&reference).await.is_ok());

        let scoped_other = TenantScopedProxy::new(
            InProcessResourceProxy::new(inner_store_handle(&inner)),
            "aws-2",
        );
        let err = scoped_other.get(&reference).await.unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::NotFound);
    }

    // The two proxies above must share the same backing store: this helper
    // stands in for what a real caller does (construct one `Arc<Store>`
    // once and share it), since `InProcessResourceProxy` owns its `Arc`.
    fn inner_store_handle(proxy: &InProcessResourceProxy) -> Arc<Store> {
        proxy.store.clone()
    }
}
