//! The pluggable persistence layer underneath [`crate::store::Store`].
//!
//! A `Backend` only ever sees raw `(Metadata, JSON)` pairs; it does not know
//! about `Spec` types, watch fan-out, or CAS semantics -- all of that is
//! layered on top by `Store`. This mirrors the teacher's separation between
//! a generic client surface and the concrete wire/storage format underneath.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocksdb_backend;

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::{Namespace, ResourceRef, TypeName};
use crate::raw::RawResource;

/// A raw, backend-level CRUD surface keyed by [`ResourceRef`].
///
/// Implementations are not expected to enforce CAS, finalizer, or
/// bootstrap-ordering invariants themselves -- [`crate::store::Store`] holds
/// a per-key lock around every call and is the sole writer, so a `Backend`
/// only needs to be correct under that single-writer discipline.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn get(&self, reference: &ResourceRef) -> Result<Option<RawResource>>;

    async fn list(&self, namespace: &Namespace, type_name: &TypeName) -> Result<Vec<RawResource>>;

    async fn put(&self, resource: RawResource) -> Result<()>;

    async fn delete(&self, reference: &ResourceRef) -> Result<()>;
}
