//! The store-wide error taxonomy (spec §7).
//!
//! Every crate built on top of `resource-store` maps its own errors onto
//! [`ErrorKind`] so callers can match on a stable, cross-crate-consistent
//! kind without downcasting concrete `snafu` error types.

use snafu::Snafu;

use crate::metadata::ResourceRef;

/// The stable error taxonomy from spec §7. Each store/controller/RPC error
/// carries one of these so callers never need to downcast.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Conflict,
    OwnerConflict,
    Precondition,
    ValidationError,
    PermissionDenied,
    Unauthenticated,
    InvalidArgument,
    Unsupported,
    Unavailable,
    Cancelled,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("resource {reference} not found"))]
    NotFound { reference: ResourceRef },

    #[snafu(display("resource {reference} already exists"))]
    AlreadyExists { reference: ResourceRef },

    #[snafu(display(
        "conflict updating {reference}: expected version {expected}, store has {actual}"
    ))]
    Conflict {
        reference: ResourceRef,
        expected: crate::metadata::Version,
        actual: crate::metadata::Version,
    },

    #[snafu(display("cannot destroy {reference}: finalizers present: {finalizers:?}"))]
    FinalizersPresent {
        reference: ResourceRef,
        finalizers: Vec<String>,
    },

    #[snafu(display("cannot destroy {reference}: phase is not tearing-down"))]
    NotTearingDown { reference: ResourceRef },

    #[snafu(display("validation failed for {reference}: {message}"))]
    ValidationError {
        reference: ResourceRef,
        message: String,
    },

    #[snafu(display("permission denied for {reference}: {message}"))]
    PermissionDenied {
        reference: ResourceRef,
        message: String,
    },

    #[snafu(display("operation cancelled"))]
    Cancelled,

    #[snafu(display("serialization failure for {reference}: {source}"))]
    Serialization {
        reference: ResourceRef,
        source: serde_json::Error,
    },

    #[snafu(display("backend error: {message}"))]
    Backend { message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::FinalizersPresent { .. } | Error::NotTearingDown { .. } => {
                ErrorKind::Precondition
            }
            Error::ValidationError { .. } => ErrorKind::ValidationError,
            Error::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Serialization { .. } | Error::Backend { .. } => ErrorKind::Unavailable,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
