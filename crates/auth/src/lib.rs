//! Identity resolution, role/policy authorization, request signature
//! verification, and infra-provider tenant isolation (spec §4.6, §4.7).
//!
//! This crate sits in front of [`resource_store::Store`] as a decision
//! layer rather than a [`resource_store::validation::Validator`]: the
//! store's validators only ever see a [`resource_store::RawResource`], with
//! no caller identity, so the authorization decision -- which depends on
//! who is asking -- is made by the RPC surface before a call ever reaches
//! the store, using the pieces assembled here.

pub mod authorize;
pub mod error;
pub mod identity;
pub mod role;
pub mod signature;
pub mod tenant;

pub use authorize::{authorize, AuthorizationRequest, Transport, Verb};
pub use error::{Error, Result};
pub use identity::{Identity, ServiceAccount, ServiceAccountKind};
pub use role::{AccessPolicySpec, PolicyRule, Role, ServiceAccountSpec, UserSpec};
pub use signature::{Signature, SignedPayload};
