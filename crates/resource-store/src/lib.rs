//! Typed, namespaced, versioned resource store with watch semantics and
//! optimistic concurrency control.
//!
//! This crate is the storage substrate every controller and RPC surface in
//! the workspace builds on: resources are `(Namespace, Type, ID)`-addressed,
//! carry a monotonic version for CAS updates, and support label-filtered
//! watches with an optional initial-snapshot bootstrap.

pub mod backend;
pub mod error;
pub mod event;
pub mod metadata;
pub mod raw;
pub mod selector;
pub mod spec;
pub mod store;
pub mod validation;
pub mod watch;

pub use error::{Error, ErrorKind, Result};
pub use event::{WatchEvent, WatchOptions};
pub use metadata::{Annotations, Finalizer, Finalizers, Id, Labels, Metadata, Namespace, Phase, ResourceRef, TypeName, Version};
pub use raw::RawResource;
pub use selector::{LabelMatch, LabelQuery};
pub use spec::{AnyResource, Resource, Spec};
pub use store::Store;
