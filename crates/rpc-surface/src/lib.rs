//! The signed-request middleware pipeline and generic resource RPC surface
//! fronting `resource_store::Store` (spec §4.7, §6): parse -> verify
//! signature -> resolve identity -> apply ACL -> dispatch, plus the
//! infra-provider tenant-scoping decorator from spec §4.6.
//!
//! The actual gRPC transport and TLS termination are out of scope (spec
//! §1); [`middleware::Pipeline`] is the whole testable surface, callable
//! directly without a listening socket. [`transport`] is a thin adapter
//! sketch showing how a real `tonic` service would sit in front of it.

pub mod directory;
pub mod error;
pub mod middleware;
pub mod resource_proxy;
pub mod transport;

pub use directory::{IdentityDirectory, PolicyDirectory, ResolvedIdentity};
pub use error::{Error, Result};
pub use middleware::{Operation, Pipeline, Request, Response};
pub use resource_proxy::{InProcessResourceProxy, ResourceProxy, TenantScopedProxy};
