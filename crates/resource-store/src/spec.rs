//! The typed half of a resource: its `Spec`.
//!
//! Design note (spec §9, "Dynamic-typed resource payloads -> tagged
//! variants"): the store itself only ever handles `(type_name, payload)`
//! pairs (see [`crate::backend`]); a registered [`Spec`] implementation is
//! how a controller gets back a concrete type. Generic code that needs to
//! operate over "any resource" uses [`AnyResource`], which exposes only
//! metadata, structural equality, and a deep copy -- deliberately not the
//! concrete spec, mirroring a trait-object interface rather than an enum of
//! every known type.

use std::fmt::Debug;

use crate::metadata::Metadata;

/// A concrete resource payload type, e.g. `ClusterSpec` or `MachineSetSpec`.
///
/// `TYPE` is the stable type string used as the store's type tag (spec §3:
/// "Type is a stable string"). Equality is structural (`PartialEq`) and is
/// exactly the "no change" comparison spec §3 calls for: it never looks at
/// `Metadata`.
pub trait Spec: Clone + Debug + PartialEq + Send + Sync + serde::Serialize + 'static
where
    for<'de> Self: serde::Deserialize<'de>,
{
    const TYPE: &'static str;
}

/// A typed resource: its lifecycle envelope plus a concrete `Spec`.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource<S: Spec> {
    pub metadata: Metadata,
    pub spec: S,
}

impl<S: Spec> Resource<S> {
    pub fn new(metadata: Metadata, spec: S) -> Self {
        Self { metadata, spec }
    }
}

/// A type-erased view over any [`Resource<S>`], used by generic store/runtime
/// code that must not know concrete spec types (e.g. the cleanup-handler
/// framework, or a resource proxy that forwards arbitrary kinds).
pub trait AnyResource: Send + Sync + Debug {
    fn metadata(&self) -> &Metadata;

    /// Structural equality of the underlying `Spec`, ignoring `Metadata`.
    fn spec_eq(&self, other: &dyn AnyResource) -> bool;

    fn deep_copy(&self) -> Box<dyn AnyResource>;

    /// The spec serialized as JSON, for storage or transport.
    fn spec_json(&self) -> serde_json::Result<serde_json::Value>;
}

impl<S: Spec> AnyResource for Resource<S> {
    fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    fn spec_eq(&self, other: &dyn AnyResource) -> bool {
        let Ok(ours) = self.spec_json() else {
            return false;
        };
        let Ok(theirs) = other.spec_json() else {
            return false;
        };
        self.metadata.type_name.0 == other.metadata().type_name.0 && ours == theirs
    }

    fn deep_copy(&self) -> Box<dyn AnyResource> {
        Box::new(self.clone())
    }

    fn spec_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.spec)
    }
}
