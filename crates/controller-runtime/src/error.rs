//! Runtime-level errors (spec §7 "fatal conditions": duplicate exclusive
//! outputs is a startup-fatal condition the runtime refuses to run past).

use resource_store::TypeName;
use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum RuntimeError {
    #[snafu(display(
        "controllers {first} and {second} both declare exclusive ownership of output {kind}"
    ))]
    DuplicateExclusiveOutput {
        kind: TypeName,
        first: String,
        second: String,
    },
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
