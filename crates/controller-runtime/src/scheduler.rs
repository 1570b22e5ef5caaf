//! Per-controller reconcile scheduling (spec §4.2, §9 "cooperative
//! scheduler with per-controller queues"): a bounded, order-preserving,
//! deduplicating pending set feeds a single worker loop so reconciles for
//! one controller never run concurrently with each other, while different
//! controllers' workers run on independent tasks.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use resource_store::ResourceRef;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backoff::delay_for_attempt;
use crate::controller::{Controller, ReconcileAction};

struct PendingQueue {
    order: VecDeque<ResourceRef>,
    members: HashSet<ResourceRef>,
}

impl PendingQueue {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
        }
    }

    /// Enqueues `key`, returning `false` if it was already pending (the
    /// dedup spec §9 calls for).
    fn push(&mut self, key: ResourceRef) -> bool {
        if self.members.insert(key.clone()) {
            self.order.push_back(key);
            true
        } else {
            false
        }
    }

    fn pop(&mut self) -> Option<ResourceRef> {
        let key = self.order.pop_front()?;
        self.members.remove(&key);
        Some(key)
    }
}

/// Drives one controller's reconcile loop: pops one key at a time, invokes
/// `reconcile`, and on error re-enqueues the same key after a backoff delay
/// that grows with consecutive failures on that key and resets on success.
pub struct Worker {
    controller: Arc<dyn Controller>,
    queue: Mutex<PendingQueue>,
    notify: Notify,
    failure_counts: Mutex<HashMap<ResourceRef, u32>>,
}

impl Worker {
    pub fn new(controller: Arc<dyn Controller>) -> Arc<Self> {
        Arc::new(Self {
            controller,
            queue: Mutex::new(PendingQueue::new()),
            notify: Notify::new(),
            failure_counts: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        self.controller.name()
    }

    /// Wakes the worker for `key`. Returns `true` if this was a fresh
    /// enqueue.
    pub fn wake(&self, key: ResourceRef) -> bool {
        let fresh = self.queue.lock().expect("pending queue poisoned").push(key);
        if fresh {
            self.notify.notify_one();
        }
        fresh
    }

    fn reset_failures(&self, key: &ResourceRef) {
        self.failure_counts.lock().expect("failure counts poisoned").remove(key);
    }

    fn bump_failures(&self, key: &ResourceRef) -> u32 {
        let mut counts = self.failure_counts.lock().expect("failure counts poisoned");
        let entry = counts.entry(key.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Runs the reconcile loop until `cancel` fires. Intended to be spawned
    /// as its own task per controller (spec §4.2: "across controllers they
    /// run in parallel").
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let span = tracing::info_span!("controller_worker", controller = self.name());
        async move {
            loop {
                let next = self.queue.lock().expect("pending queue poisoned").pop();
                let Some(key) = next else {
                    tokio::select! {
                        () = self.notify.notified() => continue,
                        () = cancel.cancelled() => return,
                    }
                };

                let result = tokio::select! {
                    result = self.controller.reconcile(&key) => result,
                    () = cancel.cancelled() => return,
                };

                match result {
                    Ok(ReconcileAction::Complete) => {
                        self.reset_failures(&key);
                    }
                    Ok(ReconcileAction::Requeue(delay)) => {
                        self.reset_failures(&key);
                        self.schedule_requeue(key, delay, cancel.clone());
                    }
                    Err(error) => {
                        let attempt = self.bump_failures(&key);
                        let delay = delay_for_attempt(attempt);
                        tracing::warn!(
                            controller = self.name(),
                            key = %key,
                            attempt,
                            ?delay,
                            %error,
                            "reconcile failed, backing off"
                        );
                        self.schedule_requeue(key, delay, cancel.clone());
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    fn schedule_requeue(self: &Arc<Self>, key: ResourceRef, delay: std::time::Duration, cancel: CancellationToken) {
        let worker = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => worker.wake(key),
                () = cancel.cancelled() => return,
            };
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use resource_store::{Namespace, Result, TypeName};

    use super::*;
    use crate::controller::{InputDecl, OutputDecl};

    struct CountingController {
        calls: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Controller for CountingController {
        fn name(&self) -> &str {
            "counting"
        }

        fn inputs(&self) -> Vec<InputDecl> {
            vec![]
        }

        fn outputs(&self) -> Vec<OutputDecl> {
            vec![]
        }

        async fn reconcile(&self, _trigger: &ResourceRef) -> Result<ReconcileAction> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return resource_store::error::BackendSnafu { message: "transient".to_owned() }.fail();
            }
            Ok(ReconcileAction::Complete)
        }
    }

    fn key() -> ResourceRef {
        ResourceRef::new(Namespace::from("default"), TypeName::from("Widgets"), "w1")
    }

    #[tokio::test]
    async fn duplicate_wakes_for_same_key_deduplicate() {
        let controller = Arc::new(CountingController { calls: AtomicUsize::new(0), fail_first: false });
        let worker = Worker::new(controller);
        assert!(worker.wake(key()));
        assert!(!worker.wake(key()), "second wake for the same key must not re-enqueue");
    }

    #[tokio::test]
    async fn reconciles_once_per_wake_and_recovers_from_failure() {
        let controller = Arc::new(CountingController { calls: AtomicUsize::new(0), fail_first: true });
        let worker = Worker::new(controller.clone());
        let cancel = CancellationToken::new();

        worker.wake(key());
        let handle = tokio::spawn(worker.clone().run(cancel.clone()));

        // First attempt fails and schedules a 1s backoff; wait past it.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        cancel.cancel();
        let _ = handle.await;

        assert_eq!(controller.calls.load(Ordering::SeqCst), 2);
    }
}
