//! Watch events (spec §4.1, §5).
//!
//! `Bootstrapped` is emitted exactly once per watch, immediately after the
//! initial snapshot, when the caller asked for `with_bootstrap_contents`
//! (spec §4.1, §5: "across multiple watches" it is never synchronized).

use crate::error::Error;
use crate::metadata::{Labels, ResourceRef};
use crate::raw::RawResource;

#[derive(Clone, Debug)]
pub enum WatchEvent {
    Created(RawResource),
    Updated { old: RawResource, new: RawResource },
    Destroyed(RawResource),
    /// Emitted once after the initial snapshot of a `WatchKind` that asked
    /// for bootstrap contents.
    Bootstrapped,
    /// The watch could not continue (e.g. the store dropped it, or a
    /// validation invariant was violated upstream); the receiver should
    /// treat this the same as a closed channel.
    Errored(String),
}

impl WatchEvent {
    pub fn reference(&self) -> Option<ResourceRef> {
        match self {
            WatchEvent::Created(r) | WatchEvent::Destroyed(r) => Some(r.metadata.reference()),
            WatchEvent::Updated { new, .. } => Some(new.metadata.reference()),
            WatchEvent::Bootstrapped | WatchEvent::Errored(_) => None,
        }
    }

    /// The labels a `WatchKind` label query is matched against; `None` for
    /// the synthetic `Bootstrapped`/`Errored` events, which every label-scoped
    /// watch still receives verbatim (spec §9: "preserve `bootstrapped/
    /// errored` events verbatim").
    pub fn labels(&self) -> Option<&Labels> {
        match self {
            WatchEvent::Created(r) | WatchEvent::Destroyed(r) => Some(&r.metadata.labels),
            WatchEvent::Updated { new, .. } => Some(&new.metadata.labels),
            WatchEvent::Bootstrapped | WatchEvent::Errored(_) => None,
        }
    }
}

/// Options controlling a `WatchKind` subscription.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
    pub with_bootstrap_contents: bool,
}

pub type WatchResult<T> = Result<T, Error>;
