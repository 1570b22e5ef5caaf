//! Drives convergence of the fixed set of domain controllers (spec §4.2).
//!
//! A [`Controller`] declares its input kinds (with a wake-up mode) and
//! output kinds (with an ownership mode); a [`runtime::Runtime`] schedules
//! reconciles per-controller-serialized, cross-controller-parallel, with
//! capped exponential backoff on failure and output-ownership validation at
//! startup.

pub mod backoff;
pub mod cleanup;
pub mod controller;
pub mod error;
pub mod runtime;
pub mod scheduler;

pub use cleanup::{Chain as CleanupChain, Handler as CleanupHandler};
pub use controller::{Controller, InputDecl, InputMode, OutputDecl, OutputMode, ReconcileAction};
pub use error::RuntimeError;
pub use runtime::{Runtime, RuntimeBuilder};
pub use scheduler::Worker;
