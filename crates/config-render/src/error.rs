//! Errors for patch merging and the apply protocol (spec §4.4, mapped onto
//! the shared spec §7 taxonomy via [`resource_store::ErrorKind`]).

use resource_store::ErrorKind;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("merged config is {size} bytes, exceeds the {max} byte cap"))]
    SizeExceeded { size: usize, max: usize },

    #[snafu(display("rendered config is not valid YAML: {source}"))]
    InvalidYaml { source: serde_yaml::Error },

    #[snafu(display("rendered config failed validation: {message}"))]
    Validation { message: String },

    #[snafu(display("failed to push rendered config to machine {machine_id}: {message}"))]
    Push { machine_id: String, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SizeExceeded { .. } | Error::InvalidYaml { .. } | Error::Validation { .. } => {
                ErrorKind::ValidationError
            }
            Error::Push { .. } => ErrorKind::Unavailable,
        }
    }
}
