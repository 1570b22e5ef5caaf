//! Errors specific to the RPC surface, mapped onto
//! [`resource_store::ErrorKind`] the same way every other crate built on
//! the store does (spec §7).

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("auth: {source}"))]
    Auth { source: auth::Error },

    #[snafu(display("store: {source}"))]
    Store { source: resource_store::Error },

    #[snafu(display("request deadline exceeded before dispatch completed"))]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> resource_store::ErrorKind {
        match self {
            Error::Auth { source } => source.kind(),
            Error::Store { source } => source.kind(),
            Error::Cancelled => resource_store::ErrorKind::Cancelled,
        }
    }
}

impl From<auth::Error> for Error {
    fn from(source: auth::Error) -> Self {
        Error::Auth { source }
    }
}

impl From<resource_store::Error> for Error {
    fn from(source: resource_store::Error) -> Self {
        Error::Store { source }
    }
}
