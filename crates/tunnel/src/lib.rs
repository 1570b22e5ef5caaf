//! The machine join protocol and per-machine stream multiplex (spec §6):
//! join-token redemption creates `Link`/`Machine` resources, after which a
//! machine's single tunnel connection carries three independent logical
//! streams -- config push, event stream, and a proxied Talos API.

pub mod error;
pub mod join;
pub mod link_watch;
pub mod registry;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use join::join;
pub use link_watch::drive_session_teardown_on_link_destroy;
pub use registry::SessionRegistry;
pub use session::{MachineEndpoints, TunnelEvent, TunnelSession};
pub use types::{JoinTokenSpec, JoinTokenStatusSpec};
