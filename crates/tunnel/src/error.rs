//! Errors specific to the tunnel crate, mapped onto
//! [`resource_store::ErrorKind`] the same way every other crate built on
//! the store does (spec §7).

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("join token is invalid or expired"))]
    InvalidJoinToken,

    #[snafu(display("machine {machine_id} is already joined"))]
    AlreadyJoined { machine_id: String },

    #[snafu(display("store error: {source}"))]
    Store { source: resource_store::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> resource_store::ErrorKind {
        match self {
            Error::InvalidJoinToken => resource_store::ErrorKind::Unauthenticated,
            Error::AlreadyJoined { .. } => resource_store::ErrorKind::AlreadyExists,
            Error::Store { source } => source.kind(),
        }
    }
}

impl From<resource_store::Error> for Error {
    fn from(source: resource_store::Error) -> Self {
        Error::Store { source }
    }
}
