//! The controller contract (spec §4.2): inputs with a wake-up mode, outputs
//! with an ownership mode, and a single `reconcile` entry point invoked once
//! per pending key.

use std::time::Duration;

use async_trait::async_trait;
use resource_store::{ResourceRef, Result, TypeName};

/// How a controller reacts to a change on one of its declared input kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InputMode {
    /// Any create/update/destroy on this kind wakes the controller.
    Strong,
    /// Read during reconciliation but never wakes the controller on its own.
    Weak,
    /// Wakes the controller only once the input has finished tearing down
    /// (finalizers empty, about to be destroyed) -- used by cleanup
    /// handlers that must run after their dependency is otherwise gone.
    DestroyReady,
}

/// A single declared input kind and the mode it is watched in.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InputDecl {
    pub kind: TypeName,
    pub mode: InputMode,
}

impl InputDecl {
    pub fn strong(kind: impl Into<TypeName>) -> Self {
        Self { kind: kind.into(), mode: InputMode::Strong }
    }

    pub fn weak(kind: impl Into<TypeName>) -> Self {
        Self { kind: kind.into(), mode: InputMode::Weak }
    }

    pub fn destroy_ready(kind: impl Into<TypeName>) -> Self {
        Self { kind: kind.into(), mode: InputMode::DestroyReady }
    }
}

/// Who is allowed to write a declared output kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputMode {
    /// Only this controller may write this kind; the runtime refuses to
    /// start if two controllers both declare `Exclusive` for the same kind
    /// (spec §5 "Shared-resource policy").
    Exclusive,
    /// Multiple controllers may write this kind cooperatively.
    Shared,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OutputDecl {
    pub kind: TypeName,
    pub mode: OutputMode,
}

impl OutputDecl {
    pub fn exclusive(kind: impl Into<TypeName>) -> Self {
        Self { kind: kind.into(), mode: OutputMode::Exclusive }
    }

    pub fn shared(kind: impl Into<TypeName>) -> Self {
        Self { kind: kind.into(), mode: OutputMode::Shared }
    }
}

/// What a `reconcile` call asks the scheduler to do next with this key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReconcileAction {
    /// The key converged; nothing further is scheduled unless a new input
    /// change wakes it again.
    Complete,
    /// Re-run reconciliation after `Duration`, regardless of further input
    /// changes (used for time-driven state like polling a schedule).
    Requeue(Duration),
}

/// One controller registered with a [`crate::runtime::Runtime`].
///
/// `reconcile` is called with the [`ResourceRef`] of the input that woke it;
/// a controller is free to re-derive the rest of its working set (parent,
/// siblings, ...) via the store inside the call. The runtime guarantees
/// reconciles for the *same controller* are serialized; across controllers
/// they run concurrently (spec §4.2, §5).
#[async_trait]
pub trait Controller: Send + Sync {
    /// A stable, unique name used in logs, backoff bookkeeping, and
    /// duplicate-exclusive-output diagnostics.
    fn name(&self) -> &str;

    fn inputs(&self) -> Vec<InputDecl>;

    fn outputs(&self) -> Vec<OutputDecl>;

    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction>;
}
