//! Errors specific to the auth crate, mapped onto
//! [`resource_store::ErrorKind`] the same way every other crate built on
//! the store does (spec §7).

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("request is unauthenticated: {message}"))]
    Unauthenticated { message: String },

    #[snafu(display("permission denied: {message}"))]
    PermissionDenied { message: String },

    #[snafu(display("malformed signature: {message}"))]
    MalformedSignature { message: String },

    #[snafu(display("store error: {source}"))]
    Store { source: resource_store::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> resource_store::ErrorKind {
        match self {
            Error::Unauthenticated { .. } => resource_store::ErrorKind::Unauthenticated,
            Error::PermissionDenied { .. } => resource_store::ErrorKind::PermissionDenied,
            Error::MalformedSignature { .. } => resource_store::ErrorKind::InvalidArgument,
            Error::Store { source } => source.kind(),
        }
    }
}

impl From<resource_store::Error> for Error {
    fn from(source: resource_store::Error) -> Self {
        Error::Store { source }
    }
}
