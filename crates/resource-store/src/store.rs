//! The typed, namespaced, versioned resource store (spec §3, §4.1).
//!
//! `Store` is the single writer in front of a [`Backend`]: every mutating
//! call takes the per-`ResourceRef` lock, so a `Backend` implementation only
//! has to be correct for sequential access to a given key. Watches are
//! served from an in-process broadcast of [`WatchEvent`]s built up as the
//! lock is held, which is what keeps event order consistent with backend
//! writes (spec §4.1: "watch events for a given resource are delivered in
//! the order they were written").

use std::collections::BTreeMap;
use std::sync::Arc;

use snafu::OptionExt;
use tokio::sync::{broadcast, Mutex};

use crate::backend::Backend;
use crate::error::{self, Error, Result};
use crate::event::{WatchEvent, WatchOptions};
use crate::metadata::{Labels, Metadata, Namespace, Phase, ResourceRef, TypeName, Version};
use crate::raw::RawResource;
use crate::selector::LabelQuery;
use crate::spec::{Resource, Spec};
use crate::validation::Validator;

/// Capacity of the per-store broadcast channel backing `Watch`. A slow
/// watcher that falls behind by more than this many events receives a
/// `Lagged` error on its next recv and should re-list.
const WATCH_CHANNEL_CAPACITY: usize = 4096;

struct KeyLocks {
    locks: std::sync::Mutex<BTreeMap<ResourceRef, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    fn new() -> Self {
        Self {
            locks: std::sync::Mutex::new(BTreeMap::new()),
        }
    }

    fn get(&self, reference: &ResourceRef) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().expect("key lock registry poisoned");
        locks.entry(reference.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

/// A typed, namespaced resource store in front of a single [`Backend`].
///
/// One `Store` instance corresponds to one backend (the runtime keeps a
/// persistent store and a separate ephemeral store side by side, spec §4.1).
pub struct Store {
    backend: Arc<dyn Backend>,
    validator: Option<Arc<dyn Validator>>,
    key_locks: KeyLocks,
    events: broadcast::Sender<WatchEvent>,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl Store {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CHANNEL_CAPACITY);
        Self {
            backend,
            validator: None,
            key_locks: KeyLocks::new(),
            events,
            clock: Arc::new(|| {
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0)
            }),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> u64 + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub async fn get<S: Spec>(&self, reference: &ResourceRef) -> Result<Resource<S>> {
        let raw = self
            .backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })?;
        raw.into_typed()
    }

    pub async fn list<S: Spec>(
        &self,
        namespace: &Namespace,
        query: &LabelQuery,
    ) -> Result<Vec<Resource<S>>> {
        let type_name = TypeName::from(S::TYPE);
        let raws = self.backend.list(namespace, &type_name).await?;
        raws.into_iter()
            .filter(|r| query.matches(&r.metadata.labels))
            .map(RawResource::into_typed)
            .collect()
    }

    pub async fn create<S: Spec>(
        &self,
        namespace: &Namespace,
        id: impl Into<crate::metadata::Id>,
        spec: S,
    ) -> Result<Resource<S>> {
        let reference = ResourceRef::new(namespace.clone(), S::TYPE, id);
        let lock = self.key_locks.get(&reference);
        let _guard = lock.lock().await;

        if self.backend.get(&reference).await?.is_some() {
            return error::AlreadyExistsSnafu {
                reference: reference.clone(),
            }
            .fail();
        }

        let metadata = Metadata::new(reference.clone(), (self.clock)());
        let resource = Resource::new(metadata, spec);
        let raw = RawResource::from_typed(&resource)?;

        if let Some(validator) = &self.validator {
            validator.validate(&raw).await?;
        }

        self.backend.put(raw.clone()).await?;
        let _ = self.events.send(WatchEvent::Created(raw));
        Ok(resource)
    }

    /// Updates a resource, failing with [`Error::Conflict`] unless
    /// `expected_version` matches the stored version (spec §3: optimistic
    /// concurrency via the version counter).
    pub async fn update<S: Spec>(
        &self,
        reference: &ResourceRef,
        expected_version: Version,
        mutate: impl FnOnce(&mut S, &mut Metadata) + Send,
    ) -> Result<Resource<S>> {
        let lock = self.key_locks.get(reference);
        let _guard = lock.lock().await;

        let existing = self
            .backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })?;

        if existing.metadata.version != expected_version {
            return error::ConflictSnafu {
                reference: reference.clone(),
                expected: expected_version,
                actual: existing.metadata.version,
            }
            .fail();
        }

        let old = existing.clone();
        let mut typed: Resource<S> = existing.into_typed()?;
        mutate(&mut typed.spec, &mut typed.metadata);
        typed.metadata.version = expected_version.next();

        let new_raw = RawResource::from_typed(&typed)?;

        if let Some(validator) = &self.validator {
            validator.validate(&new_raw).await?;
        }

        self.backend.put(new_raw.clone()).await?;
        let _ = self.events.send(WatchEvent::Updated {
            old,
            new: new_raw,
        });
        Ok(typed)
    }

    /// Marks a resource for teardown (spec §3.2): sets its phase to
    /// `TearingDown`. Finalizer owners observe this via `Watch` and must
    /// remove their finalizer before `destroy` can succeed.
    pub async fn teardown(&self, reference: &ResourceRef) -> Result<()> {
        let lock = self.key_locks.get(reference);
        let _guard = lock.lock().await;

        let existing = self
            .backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })?;
        if existing.metadata.is_tearing_down() {
            return Ok(());
        }

        let old = existing.clone();
        let mut new = existing;
        new.metadata.phase = Phase::TearingDown;
        new.metadata.version = new.metadata.version.next();
        self.backend.put(new.clone()).await?;
        let _ = self.events.send(WatchEvent::Updated { old, new });
        Ok(())
    }

    /// Permanently removes a resource. Fails with
    /// [`Error::FinalizersPresent`] if any finalizer remains, and with
    /// [`Error::NotTearingDown`] unless `teardown` was called first (spec
    /// §3.2, §8: destruction is always finalizer-gated).
    pub async fn destroy(&self, reference: &ResourceRef) -> Result<()> {
        let lock = self.key_locks.get(reference);
        let _guard = lock.lock().await;

        let existing = self
            .backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })?;

        if !existing.metadata.is_tearing_down() {
            return error::NotTearingDownSnafu {
                reference: reference.clone(),
            }
            .fail();
        }
        if !existing.metadata.finalizers.is_empty() {
            return error::FinalizersPresentSnafu {
                reference: reference.clone(),
                finalizers: existing.metadata.finalizers.iter().cloned().collect::<Vec<_>>(),
            }
            .fail();
        }

        self.backend.delete(reference).await?;
        let _ = self.events.send(WatchEvent::Destroyed(existing));
        Ok(())
    }

    /// Untyped counterpart to [`Store::get`], for callers that address
    /// resources by a runtime `TypeName` rather than a compile-time `Spec`
    /// (spec §9's "generic operations over any resource"; this is what a
    /// generic Resource RPC surface dispatches through).
    pub async fn get_raw(&self, reference: &ResourceRef) -> Result<RawResource> {
        self.backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })
    }

    /// Untyped counterpart to [`Store::list`].
    pub async fn list_raw(
        &self,
        namespace: &Namespace,
        type_name: &TypeName,
        query: &LabelQuery,
    ) -> Result<Vec<RawResource>> {
        let raws = self.backend.list(namespace, type_name).await?;
        Ok(raws.into_iter().filter(|r| query.matches(&r.metadata.labels)).collect())
    }

    /// Untyped counterpart to [`Store::create`]: `payload` is stored as-is,
    /// without a round-trip through a concrete `Spec` type. `labels` seeds
    /// the new resource's label set (e.g. the auto-applied
    /// infra-provider-id label from spec §4.6).
    pub async fn create_raw(
        &self,
        reference: ResourceRef,
        payload: serde_json::Value,
        labels: Labels,
        created_at: u64,
    ) -> Result<RawResource> {
        let lock = self.key_locks.get(&reference);
        let _guard = lock.lock().await;

        if self.backend.get(&reference).await?.is_some() {
            return error::AlreadyExistsSnafu {
                reference: reference.clone(),
            }
            .fail();
        }

        let mut metadata = Metadata::new(reference, created_at);
        metadata.labels = labels;
        let raw = RawResource { metadata, payload };

        if let Some(validator) = &self.validator {
            validator.validate(&raw).await?;
        }

        self.backend.put(raw.clone()).await?;
        let _ = self.events.send(WatchEvent::Created(raw.clone()));
        Ok(raw)
    }

    /// Untyped counterpart to [`Store::update`]: `mutate` rewrites the raw
    /// metadata/payload pair directly (e.g. to merge finalizers onto a
    /// payload whose concrete `Spec` type the caller doesn't know).
    pub async fn update_raw(
        &self,
        reference: &ResourceRef,
        expected_version: Version,
        mutate: impl FnOnce(&mut RawResource) + Send,
    ) -> Result<RawResource> {
        let lock = self.key_locks.get(reference);
        let _guard = lock.lock().await;

        let existing = self
            .backend
            .get(reference)
            .await?
            .context(error::NotFoundSnafu {
                reference: reference.clone(),
            })?;

        if existing.metadata.version != expected_version {
            return error::ConflictSnafu {
                reference: reference.clone(),
                expected: expected_version,
                actual: existing.metadata.version,
            }
            .fail();
        }

        let old = existing.clone();
        let mut new = existing;
        mutate(&mut new);
        new.metadata.version = expected_version.next();

        if let Some(validator) = &self.validator {
            validator.validate(&new).await?;
        }

        self.backend.put(new.clone()).await?;
        let _ = self.events.send(WatchEvent::Updated { old, new: new.clone() });
        Ok(new)
    }

    /// Subscribes to every event for a single resource (spec §4.1's
    /// `Watch(ref, ch)`), narrowing a kind-wide watch down with
    /// [`crate::watch::filter`].
    pub async fn watch(
        &self,
        reference: &ResourceRef,
        options: WatchOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<WatchEvent>> {
        let rx = self
            .watch_kind(
                &reference.namespace,
                &reference.type_name,
                Labels::new(),
                options,
            )
            .await?;
        let id = reference.id.clone();
        Ok(crate::watch::filter(rx, move |event| {
            event.reference().is_some_and(|r| r.id == id)
        }))
    }

    /// Retries `mutate` against the latest version on `Conflict`, the
    /// helper spec §4.1 calls `UpdateWithConflicts`. The mutator is re-run
    /// from scratch against a fresh read each attempt, so it must be
    /// idempotent given the same starting state; `attempts` bounds retries
    /// so a hot key under contention cannot spin forever.
    pub async fn update_with_conflicts<S: Spec>(
        &self,
        reference: &ResourceRef,
        attempts: usize,
        mut mutate: impl FnMut(&mut S, &mut Metadata) + Send,
    ) -> Result<Resource<S>> {
        let mut last_err = None;
        for _ in 0..attempts.max(1) {
            let current: Resource<S> = self.get(reference).await?;
            let version = current.metadata.version;
            match self.update(reference, version, &mut mutate).await {
                Ok(updated) => return Ok(updated),
                Err(err) if err.is_conflict() => {
                    last_err = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }

    /// Subscribes to every event for a `(Namespace, Type)`, optionally
    /// preceded by a snapshot of current contents terminated by a single
    /// [`WatchEvent::Bootstrapped`] (spec §4.1, §5).
    pub async fn watch_kind(
        &self,
        namespace: &Namespace,
        type_name: &TypeName,
        labels: Labels,
        options: WatchOptions,
    ) -> Result<tokio::sync::mpsc::Receiver<WatchEvent>> {
        let query = LabelQuery::from_labels(labels);
        let mut upstream = self.events.subscribe();
        let (tx, rx) = tokio::sync::mpsc::channel(WATCH_CHANNEL_CAPACITY);

        let snapshot = if options.with_bootstrap_contents {
            Some(
                self.backend
                    .list(namespace, type_name)
                    .await?
                    .into_iter()
                    .filter(|r| query.matches(&r.metadata.labels))
                    .collect::<Vec<_>>(),
            )
        } else {
            None
        };

        let namespace = namespace.clone();
        let type_name = type_name.clone();
        tokio::spawn(async move {
            if let Some(snapshot) = snapshot {
                for raw in snapshot {
                    if tx.send(WatchEvent::Created(raw)).await.is_err() {
                        return;
                    }
                }
                if tx.send(WatchEvent::Bootstrapped).await.is_err() {
                    return;
                }
            }

            loop {
                match upstream.recv().await {
                    Ok(event) => {
                        let matches = event.reference().is_some_and(|r| r.namespace == namespace && r.type_name == type_name)
                            && event.labels().is_none_or(|l| query.matches(l));
                        if matches && tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {
                        if tx
                            .send(WatchEvent::Errored("watch lagged behind store writes".into()))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::backend::memory::MemoryBackend;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct WidgetSpec {
        color: String,
    }

    impl Spec for WidgetSpec {
        const TYPE: &'static str = "Widgets";
    }

    fn store() -> Store {
        Store::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = store();
        let ns = Namespace::from("default");
        let created = store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        assert_eq!(created.metadata.version, Version::INITIAL);

        let fetched: Resource<WidgetSpec> = store.get(&created.metadata.reference()).await.unwrap();
        assert_eq!(fetched.spec.color, "red");
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = store();
        let ns = Namespace::from("default");
        store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        let err = store
            .create(&ns, "w1", WidgetSpec { color: "blue".into() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), error::ErrorKind::AlreadyExists);
    }

    #[tokio::test]
    async fn update_with_stale_version_conflicts() {
        let store = store();
        let ns = Namespace::from("default");
        let created = store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        let reference = created.metadata.reference();

        store
            .update::<WidgetSpec>(&reference, Version::INITIAL, |spec, _| {
                spec.color = "green".into();
            })
            .await
            .unwrap();

        let err = store
            .update::<WidgetSpec>(&reference, Version::INITIAL, |spec, _| {
                spec.color = "blue".into();
            })
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn destroy_is_gated_by_finalizers_and_teardown() {
        let store = store();
        let ns = Namespace::from("default");
        let created = store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        let reference = created.metadata.reference();

        // Destroying before teardown fails.
        assert!(matches!(
            store.destroy(&reference).await,
            Err(Error::NotTearingDown { .. })
        ));

        store
            .update::<WidgetSpec>(&reference, Version::INITIAL, |_, metadata| {
                metadata.add_finalizer("owner");
            })
            .await
            .unwrap();

        store.teardown(&reference).await.unwrap();

        // Destroying with a finalizer present fails.
        assert!(matches!(
            store.destroy(&reference).await,
            Err(Error::FinalizersPresent { .. })
        ));

        store
            .update::<WidgetSpec>(&reference, Version(3), |_, metadata| {
                metadata.remove_finalizer("owner");
            })
            .await
            .unwrap();

        store.destroy(&reference).await.unwrap();
        assert!(store.get::<WidgetSpec>(&reference).await.is_err());
    }

    #[tokio::test]
    async fn watch_bootstraps_then_streams_live_events() {
        let store = store();
        let ns = Namespace::from("default");
        store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();

        let mut rx = store
            .watch_kind(
                &ns,
                &TypeName::from("Widgets"),
                Labels::new(),
                WatchOptions {
                    with_bootstrap_contents: true,
                },
            )
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert!(matches!(snapshot, WatchEvent::Created(_)));
        let bootstrapped = rx.recv().await.unwrap();
        assert!(matches!(bootstrapped, WatchEvent::Bootstrapped));

        store
            .create(&ns, "w2", WidgetSpec { color: "blue".into() })
            .await
            .unwrap();

        let live = rx.recv().await.unwrap();
        assert!(matches!(live, WatchEvent::Created(r) if r.metadata.id.0 == "w2"));
    }

    #[tokio::test]
    async fn watch_kind_scopes_snapshot_and_live_events_to_the_label_query() {
        let store = store();
        let ns = Namespace::from("default");

        let red = store.create(&ns, "w1", WidgetSpec { color: "red".into() }).await.unwrap();
        store
            .update::<WidgetSpec>(&red.metadata.reference(), red.metadata.version, |_, metadata| {
                metadata.labels.insert("color".into(), "red".into());
            })
            .await
            .unwrap();
        let blue = store.create(&ns, "w2", WidgetSpec { color: "blue".into() }).await.unwrap();
        store
            .update::<WidgetSpec>(&blue.metadata.reference(), blue.metadata.version, |_, metadata| {
                metadata.labels.insert("color".into(), "blue".into());
            })
            .await
            .unwrap();

        let mut query_labels = Labels::new();
        query_labels.insert("color".into(), "red".into());
        let mut rx = store
            .watch_kind(
                &ns,
                &TypeName::from("Widgets"),
                query_labels,
                WatchOptions {
                    with_bootstrap_contents: true,
                },
            )
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert!(matches!(snapshot, WatchEvent::Created(r) if r.metadata.id.0 == "w1"));
        let bootstrapped = rx.recv().await.unwrap();
        assert!(matches!(bootstrapped, WatchEvent::Bootstrapped));

        // A live create for a non-matching label never reaches this watch: it
        // never shows up as an event on `rx` at all, matching or otherwise.
        store.create(&ns, "w4", WidgetSpec { color: "yellow".into() }).await.unwrap();

        // A later matching update does reach it -- proving the watch is
        // still alive and the w4 event above was filtered, not merely
        // delayed.
        let green = store.create(&ns, "w3", WidgetSpec { color: "green".into() }).await.unwrap();
        store
            .update::<WidgetSpec>(&green.metadata.reference(), green.metadata.version, |_, metadata| {
                metadata.labels.insert("color".into(), "red".into());
            })
            .await
            .unwrap();
        let live = rx.recv().await.unwrap();
        assert!(matches!(live, WatchEvent::Updated { new, .. } if new.metadata.id.0 == "w3"));
    }

    #[tokio::test]
    async fn update_with_conflicts_retries_on_stale_version() {
        let store = Arc::new(store());
        let ns = Namespace::from("default");
        let created = store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        let reference = created.metadata.reference();

        // A concurrent writer bumps the version between our read and write
        // on the first attempt; `update_with_conflicts` must re-read and
        // retry rather than surfacing the conflict.
        let racer = store.clone();
        let racer_ref = reference.clone();
        racer
            .update::<WidgetSpec>(&racer_ref, Version::INITIAL, |spec, _| {
                spec.color = "green".into();
            })
            .await
            .unwrap();

        let mut calls = 0;
        let updated = store
            .update_with_conflicts::<WidgetSpec>(&reference, 3, |spec, _| {
                calls += 1;
                spec.color = format!("{}-tagged", spec.color);
            })
            .await
            .unwrap();

        assert_eq!(updated.spec.color, "green-tagged");
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn watch_narrows_to_a_single_resource() {
        let store = store();
        let ns = Namespace::from("default");
        store
            .create(&ns, "w1", WidgetSpec { color: "red".into() })
            .await
            .unwrap();
        let other = store
            .create(&ns, "w2", WidgetSpec { color: "blue".into() })
            .await
            .unwrap();

        let mut rx = store
            .watch(&other.metadata.reference(), WatchOptions::default())
            .await
            .unwrap();

        store
            .update::<WidgetSpec>(&other.metadata.reference(), Version::INITIAL, |spec, _| {
                spec.color = "green".into();
            })
            .await
            .unwrap();
        store
            .update::<WidgetSpec>(
                &ResourceRef::new(ns, "Widgets", "w1"),
                Version::INITIAL,
                |spec, _| spec.color = "purple".into(),
            )
            .await
            .unwrap();

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, WatchEvent::Updated { new, .. } if new.metadata.id.0 == "w2"));
    }

    #[tokio::test]
    async fn raw_create_get_update_round_trip_without_a_spec_type() {
        let store = store();
        let reference = ResourceRef::new(Namespace::from("default"), "Widgets", "w1");

        let created = store
            .create_raw(reference.clone(), serde_json::json!({"color": "red"}), Labels::new(), 0)
            .await
            .unwrap();
        assert_eq!(created.metadata.version, Version::INITIAL);

        let fetched = store.get_raw(&reference).await.unwrap();
        assert_eq!(fetched.payload["color"], "red");

        let updated = store
            .update_raw(&reference, Version::INITIAL, |raw| {
                raw.payload = serde_json::json!({"color": "blue"});
            })
            .await
            .unwrap();
        assert_eq!(updated.payload["color"], "blue");
        assert_eq!(updated.metadata.version, Version(2));

        let listed = store
            .list_raw(&Namespace::from("default"), &TypeName::from("Widgets"), &LabelQuery::new())
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn raw_create_twice_conflicts() {
        let store = store();
        let reference = ResourceRef::new(Namespace::from("default"), "Widgets", "w1");
        store.create_raw(reference.clone(), serde_json::json!({}), Labels::new(), 0).await.unwrap();
        let err = store.create_raw(reference, serde_json::json!({}), Labels::new(), 0).await.unwrap_err();
        assert_eq!(err.kind(), error::ErrorKind::AlreadyExists);
    }
}
