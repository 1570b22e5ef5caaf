//! Errors for the backup/restore pipeline, mapped onto the shared spec §7
//! taxonomy via [`resource_store::ErrorKind`].

use resource_store::ErrorKind;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("store error: {source}"))]
    Store { source: resource_store::Error },

    #[snafu(display("failed to upload snapshot for cluster {cluster_id} to S3: {message}"))]
    Upload { cluster_id: String, message: String },

    #[snafu(display("failed to download snapshot {snapshot_key}: {message}"))]
    Download { snapshot_key: String, message: String },

    #[snafu(display("no backup found for cluster {cluster_id}"))]
    NoBackupFound { cluster_id: String },

    #[snafu(display("failed to take etcd snapshot for cluster {cluster_id}: {message}"))]
    SnapshotFailed { cluster_id: String, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Store { source } => source.kind(),
            Error::Upload { .. } | Error::Download { .. } => ErrorKind::Unavailable,
            Error::NoBackupFound { .. } => ErrorKind::NotFound,
            Error::SnapshotFailed { .. } => ErrorKind::Unavailable,
        }
    }
}

impl From<resource_store::Error> for Error {
    fn from(source: resource_store::Error) -> Self {
        Error::Store { source }
    }
}
