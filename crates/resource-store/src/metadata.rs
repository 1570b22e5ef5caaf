//! The identity and lifecycle envelope shared by every resource in the store.
//!
//! This is deliberately untyped: [`Metadata`] carries everything the store
//! itself needs to reason about a resource (who it is, how many times it has
//! been written, whether it is tearing down) without knowing anything about
//! its `Spec`. See [`crate::spec`] for the typed half.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// The namespace a resource lives in.
///
/// Most resources live in a small set of well-known namespaces (`default`,
/// `infra-provider:<id>`, ...); namespaces are not pre-declared, a resource
/// simply carries one.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(pub String);

impl Namespace {
    pub const DEFAULT: &'static str = "default";

    pub fn default_ns() -> Self {
        Self(Self::DEFAULT.to_owned())
    }

    /// The private per-provider namespace used for infra-provider tenant
    /// isolation (spec §4.6): `infra-provider:<provider-id>`.
    pub fn infra_provider(provider_id: &str) -> Self {
        Self(format!("infra-provider:{provider_id}"))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Namespace {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Namespace {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A stable resource type string, e.g. `Clusters.omni.sidero.dev`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeName(pub String);

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The monotonically increasing per-`(Namespace, Type, ID)` write counter.
///
/// `Version(0)` is never observed by a caller: [`Version::INITIAL`] is the
/// version assigned on `Create`, and every successful `Update` increments it.
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const INITIAL: Version = Version(1);

    #[must_use]
    pub fn next(self) -> Self {
        Version(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle phase of a resource (spec §3, §3.2).
#[derive(Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Running,
    TearingDown,
}

/// A string-keyed identifier for a resource within its `(Namespace, Type)`.
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id(pub String);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The full coordinates of a resource: `(Namespace, Type, ID)`.
///
/// This is the key every store operation addresses resources by, and the
/// only way controllers refer to each other's resources (spec §9 "Cycles in
/// cluster/machine/set graph -> arena + references by ID").
#[derive(Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub namespace: Namespace,
    pub type_name: TypeName,
    pub id: Id,
}

impl ResourceRef {
    pub fn new(
        namespace: impl Into<Namespace>,
        type_name: impl Into<TypeName>,
        id: impl Into<Id>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.type_name, self.id)
    }
}

/// A named marker blocking destruction until its owner removes it (spec §3.2).
pub type Finalizer = String;

/// Labels and annotations are plain string maps; labels are additionally
/// queryable (see [`crate::selector::LabelQuery`]).
pub type Labels = BTreeMap<String, String>;
pub type Annotations = BTreeMap<String, String>;
pub type Finalizers = BTreeSet<Finalizer>;

/// The untyped identity/lifecycle envelope for a resource.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub namespace: Namespace,
    pub type_name: TypeName,
    pub id: Id,
    pub version: Version,
    pub labels: Labels,
    pub annotations: Annotations,
    pub finalizers: Finalizers,
    pub phase: Phase,
    /// Unix-second creation timestamp, set once on `Create` and never updated.
    pub created_at: u64,
}

impl Metadata {
    pub fn new(r: ResourceRef, created_at: u64) -> Self {
        Self {
            namespace: r.namespace,
            type_name: r.type_name,
            id: r.id,
            version: Version::INITIAL,
            labels: Labels::new(),
            annotations: Annotations::new(),
            finalizers: Finalizers::new(),
            phase: Phase::Running,
            created_at,
        }
    }

    pub fn reference(&self) -> ResourceRef {
        ResourceRef {
            namespace: self.namespace.clone(),
            type_name: self.type_name.clone(),
            id: self.id.clone(),
        }
    }

    pub fn has_finalizer(&self, name: &str) -> bool {
        self.finalizers.contains(name)
    }

    pub fn add_finalizer(&mut self, name: impl Into<Finalizer>) -> bool {
        self.finalizers.insert(name.into())
    }

    pub fn remove_finalizer(&mut self, name: &str) -> bool {
        self.finalizers.remove(name)
    }

    pub fn is_tearing_down(&self) -> bool {
        matches!(self.phase, Phase::TearingDown)
    }
}
