//! Process startup argument parsing, generalizing the teacher's
//! `stackable_operator::cli` module (a `Command<Run: Args>` enum wrapping a
//! flattenable set of option groups) to this control plane's own startup
//! surface: which store backend to run against, where the machine tunnel
//! and resource RPC surface listen, and how tracing is configured.

pub mod error;
pub mod listen_args;
pub mod store_args;
pub mod telemetry_args;

pub use error::{Error, Result};
pub use listen_args::ListenArgs;
pub use store_args::{OpenBackendError, StoreArgs, StoreBackendKind};
pub use telemetry_args::TelemetryArgs;

use clap::Args;

pub const AUTHOR: &str = "Sidero Labs";

/// Framework-standardized top-level command, mirroring the teacher's own
/// `Command<Run: Args = ProductOperatorRun>`: a single binary need only
/// flatten [`RunArgs`] into its own argument set, or replace it entirely
/// with a superset that embeds it.
#[derive(clap::Parser, Debug, PartialEq, Eq)]
#[command(long_about = "")]
pub enum Command<Run: Args = RunArgs> {
    /// Run the control plane.
    Run(Run),
}

/// The default parameters the control-plane binary needs at startup.
#[derive(clap::Parser, Debug, PartialEq, Eq)]
#[command(long_about = "")]
pub struct RunArgs {
    #[command(flatten)]
    pub telemetry: TelemetryArgs,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub listen: ListenArgs,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        RunArgs::command().debug_assert();
    }

    #[test]
    fn run_args_parse_with_memory_backend_defaults() {
        let opts = Command::<RunArgs>::parse_from(["control-plane", "run"]);
        match opts {
            Command::Run(run) => {
                assert_eq!(run.store.backend, StoreBackendKind::Memory);
                assert!(run.telemetry.console_log_enabled);
                assert_eq!(run.listen.tunnel_listen_address.port(), 8090);
                assert_eq!(run.listen.rpc_listen_address.port(), 8091);
            }
        }
    }

    #[test]
    fn run_args_accept_explicit_rocksdb_backend_and_listen_addresses() {
        let opts = Command::<RunArgs>::parse_from([
            "control-plane",
            "run",
            "--backend",
            "rocksdb",
            "--store-path",
            "/var/lib/control-plane",
            "--tunnel-listen-address",
            "127.0.0.1:9000",
            "--rpc-listen-address",
            "127.0.0.1:9001",
        ]);
        let Command::Run(run) = opts;
        assert_eq!(run.store.backend, StoreBackendKind::Rocksdb);
        assert_eq!(run.store.store_path.as_deref(), Some(std::path::Path::new("/var/lib/control-plane")));
        assert_eq!(run.listen.rpc_listen_address.port(), 9001);
    }
}
