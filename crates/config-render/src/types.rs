//! `ConfigPatch` and the derived `ClusterMachineConfig` entity (spec.md §3,
//! §4.4).

use resource_store::{LabelQuery, Labels, Spec};

/// A single layer in a `ClusterMachineConfig`'s configuration stack,
/// applied to every machine whose labels match `selector`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConfigPatch {
    /// Stable identifier, used as the lexicographic tiebreaker when two
    /// patches match with the same label specificity.
    pub id: String,
    #[serde(default)]
    pub selector: LabelQuery,
    pub patch: serde_yaml::Value,
}

impl Spec for ConfigPatch {
    const TYPE: &'static str = "ConfigPatches.omni.sidero.dev";
}

impl ConfigPatch {
    /// The number of label terms in `selector`: "deepest-label-wins"
    /// layering treats a patch with more matching terms as more specific,
    /// so it is merged later (and so wins on overlapping keys).
    pub fn specificity(&self) -> usize {
        self.selector.term_count()
    }
}

/// The rendered, machine-specific configuration derived from a machine's
/// matching `ConfigPatch` layers.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ClusterMachineConfig {
    pub rendered: serde_yaml::Value,
}

impl Spec for ClusterMachineConfig {
    const TYPE: &'static str = "ClusterMachineConfigs.omni.sidero.dev";
}

/// The stage a machine moves through while an apply is in flight (spec
/// §4.4 step 4: "observe the reboot (stage transitions REBOOTING -> BOOTING
/// -> RUNNING)").
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MachineConfigStage {
    Running,
    Rebooting,
    Booting,
    Configuring,
}

impl MachineConfigStage {
    pub fn is_running(self) -> bool {
        matches!(self, MachineConfigStage::Running)
    }
}

/// Observed status of a `ClusterMachineConfig` once applied to a machine
/// (spec.md §4.4's Apply protocol).
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClusterMachineConfigStatus {
    /// SHA-256 hex digest of the last successfully applied rendered config.
    pub last_applied_sha256: Option<String>,
    pub last_applied_mode: Option<ApplyMode>,
    pub stage: MachineConfigStage,
    /// Set when the last apply attempt failed validation; the apply loop
    /// retries without requesting a reboot until this clears.
    pub last_error: Option<String>,
}

impl Default for ClusterMachineConfigStatus {
    fn default() -> Self {
        Self {
            last_applied_sha256: None,
            last_applied_mode: None,
            stage: MachineConfigStage::Running,
            last_error: None,
        }
    }
}

impl Spec for ClusterMachineConfigStatus {
    const TYPE: &'static str = "ClusterMachineConfigStatuses.omni.sidero.dev";
}

/// How a config apply was (or will be) carried out.
#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ApplyMode {
    /// Applied without interrupting the machine.
    Immediate,
    /// Applied, and a reboot was required to take effect.
    Reboot,
    /// Written to disk but not yet active; takes effect on next boot.
    Staged,
}

/// Labels describing a machine, used to select which `ConfigPatch` layers
/// apply to it.
pub type MachineLabels = Labels;
