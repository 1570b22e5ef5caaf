//! Listen-address flags for the tunnel and RPC surfaces, generalizing the
//! teacher's `OperatorEnvironmentOptions` (env-backed, always-required
//! process configuration) to this workspace's two listeners.

use std::net::SocketAddr;

use clap::Args;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ListenArgs {
    /// Address the machine tunnel listener binds to.
    #[arg(long, env, default_value = "0.0.0.0:8090")]
    pub tunnel_listen_address: SocketAddr,

    /// Address the resource RPC surface binds to.
    #[arg(long, env, default_value = "0.0.0.0:8091")]
    pub rpc_listen_address: SocketAddr,
}
