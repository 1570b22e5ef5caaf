//! Config patch layering, rendering, and the apply protocol (spec §4.4).

pub mod apply;
pub mod error;
pub mod merge;
pub mod render;
pub mod types;

pub use apply::{compute_sha256, decide, record_failure, record_success, requires_reboot, ApplyDecision, ConfigPusher};
pub use error::{Error, Result};
pub use merge::{deep_merge, deep_merge_all};
pub use render::{render, select_and_order, MAX_RENDERED_CONFIG_BYTES};
pub use types::{ApplyMode, ClusterMachineConfig, ClusterMachineConfigStatus, ConfigPatch, MachineConfigStage, MachineLabels};
