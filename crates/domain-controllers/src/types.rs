//! The entity table of spec §3.1, minus `ConfigPatch`/`ClusterMachineConfig*`
//! (owned by `config-render`), the etcd-backup family (owned by
//! `etcd-backup`), and the auth/infra-provider-status types that straddle
//! tenant scoping (owned by `auth`).

use resource_store::Spec;
use serde::{Deserialize, Serialize};

/// Scheduling knob shared by `UpdateStrategy` (rolling config application)
/// and `DeleteStrategy` (rolling scale-down), spec §4.3.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RollingStrategy {
    Unset,
    Rolling { max_parallelism: u32 },
}

impl RollingStrategy {
    /// `None` under `Unset` means "no cap" (every member may move at once).
    pub fn max_parallelism(self) -> Option<u32> {
        match self {
            RollingStrategy::Unset => None,
            RollingStrategy::Rolling { max_parallelism } => Some(max_parallelism),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MachineSetRole {
    ControlPlane,
    Worker,
    Extra,
}

/// Causes the first control-plane member to bootstrap etcd from a named
/// snapshot instead of from scratch (spec §4.3, §4.5 restore path).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BootstrapSpec {
    pub cluster_uuid: String,
    pub snapshot: Option<String>,
}

/// Selects machines matching a `MachineClass` label query, or requests new
/// ones from an infra provider, for an auto-provisioned `MachineSet`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineAllocation {
    pub count: u32,
    pub class_name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BackupConfiguration {
    pub enabled: bool,
    pub interval_seconds: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub talos_version: String,
    pub kubernetes_version: String,
    #[serde(default)]
    pub backup_configuration: Option<BackupConfiguration>,
    /// Binds this cluster to an existing cluster's most-recent etcd
    /// snapshot and reuses its UUID (spec §4.5: point-in-time recovery into
    /// a fresh cluster identity).
    #[serde(default)]
    pub restore_from_etcd_backup_cluster_id: Option<String>,
}

impl Spec for ClusterSpec {
    const TYPE: &'static str = "Clusters.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterUuidSpec {
    pub uuid: String,
}

impl Spec for ClusterUuidSpec {
    const TYPE: &'static str = "ClusterUUIDs.omni.sidero.dev";
}

/// Generated-once PKI and bootstrap material (spec §4.3: "created once").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterSecretsSpec {
    pub ca_certificate_pem: String,
    pub ca_private_key_pem: String,
    pub kubernetes_ca_certificate_pem: String,
    pub kubernetes_ca_private_key_pem: String,
    pub bootstrap_token: String,
}

impl Spec for ClusterSecretsSpec {
    const TYPE: &'static str = "ClusterSecrets.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterEndpointSpec {
    pub url: String,
}

impl Spec for ClusterEndpointSpec {
    const TYPE: &'static str = "ClusterEndpoints.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancerConfigSpec {
    pub virtual_ip: Option<String>,
    pub backend_port: u16,
}

impl Spec for LoadBalancerConfigSpec {
    const TYPE: &'static str = "LoadBalancerConfigs.omni.sidero.dev";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ClusterPhase {
    Initializing,
    Running,
    Unhealthy,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterStatusSpec {
    pub phase: ClusterPhase,
    pub healthy_machines: u32,
    pub total_machines: u32,
    /// Most recent snapshot of `restore_from_etcd_backup_cluster_id`'s
    /// source cluster, for binding into a control-plane `MachineSet`'s
    /// `BootstrapSpec.snapshot` (spec §4.5). `None` when this cluster isn't
    /// a restore, or no backup has been taken of the source yet.
    #[serde(default)]
    pub restored_snapshot_key: Option<String>,
}

impl Spec for ClusterStatusSpec {
    const TYPE: &'static str = "ClusterStatuses.omni.sidero.dev";
}

/// Shared progress phase for the version-upgrade trackers (spec §2 item 4:
/// "talos-upgrade, kubernetes-upgrade").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum UpgradePhase {
    /// No `ClusterMachine` yet exists, so there's nothing to converge.
    Idle,
    InProgress,
    Done,
}

/// Tracks convergence of every `ClusterMachine` in a cluster onto
/// `ClusterSpec.talos_version`, observed via `MachineStatusSpec.talos_version`
/// (spec §2 item 4, §4.3). Talos upgrades a whole cluster as one track --
/// unlike the Kubernetes upgrade, there is no control-plane/worker ordering.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TalosUpgradeStatusSpec {
    pub target_version: String,
    pub phase: UpgradePhase,
    pub upgraded_machines: u32,
    pub total_machines: u32,
}

impl Spec for TalosUpgradeStatusSpec {
    const TYPE: &'static str = "TalosUpgradeStatuses.omni.sidero.dev";
}

/// Tracks convergence of every `ClusterMachine` in a cluster onto
/// `ClusterSpec.kubernetes_version`, observed via
/// `MachineStatusSpec.kubernetes_version`. Unlike Talos, a Kubernetes upgrade
/// is staged: every control-plane member must report the target version
/// before worker convergence counts toward `Done` (kubelet/API skew rules
/// forbid workers running ahead of the control plane).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct KubernetesUpgradeStatusSpec {
    pub target_version: String,
    pub phase: UpgradePhase,
    pub control_plane_upgraded: u32,
    pub control_plane_total: u32,
    pub worker_upgraded: u32,
    pub worker_total: u32,
}

impl Spec for KubernetesUpgradeStatusSpec {
    const TYPE: &'static str = "KubernetesUpgradeStatuses.omni.sidero.dev";
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MachineSetSpec {
    pub cluster_id: String,
    pub role: MachineSetRole,
    #[serde(default)]
    pub update_strategy: RollingStrategy,
    #[serde(default)]
    pub delete_strategy: RollingStrategy,
    #[serde(default)]
    pub allocation: Option<MachineAllocation>,
    #[serde(default)]
    pub bootstrap_spec: Option<BootstrapSpec>,
}

impl Default for RollingStrategy {
    fn default() -> Self {
        RollingStrategy::Unset
    }
}

impl Spec for MachineSetSpec {
    const TYPE: &'static str = "MachineSets.omni.sidero.dev";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MachineSetPhase {
    Running,
    ScalingUp,
    ScalingDown,
    Reconfiguring,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineSetStatusSpec {
    pub phase: MachineSetPhase,
}

impl Spec for MachineSetStatusSpec {
    const TYPE: &'static str = "MachineSetStatuses.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineSetNodeSpec {
    pub machine_set_id: String,
    pub machine_id: String,
}

impl Spec for MachineSetNodeSpec {
    const TYPE: &'static str = "MachineSetNodes.omni.sidero.dev";
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub management_address: Option<String>,
}

impl Spec for MachineSpec {
    const TYPE: &'static str = "Machines.omni.sidero.dev";
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineStatusSpec {
    pub connected: bool,
    pub maintenance_mode: bool,
    pub hardware: Option<String>,
    pub network: Option<String>,
    pub talos_version: Option<String>,
    /// `kubelet`/control-plane component version actually running on the
    /// machine, as last observed over the tunnel event stream. Distinct from
    /// `talos_version` since a Talos upgrade and a Kubernetes upgrade are
    /// independent tracks (spec §2 item 4: "talos-upgrade, kubernetes-upgrade").
    #[serde(default)]
    pub kubernetes_version: Option<String>,
}

impl Spec for MachineStatusSpec {
    const TYPE: &'static str = "MachineStatuses.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LinkSpec {
    pub machine_id: String,
    pub connected_at: u64,
}

impl Spec for LinkSpec {
    const TYPE: &'static str = "Links.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterMachineSpec {
    pub cluster_id: String,
    pub machine_set_id: String,
    pub role: MachineSetRole,
}

impl Spec for ClusterMachineSpec {
    const TYPE: &'static str = "ClusterMachines.omni.sidero.dev";
}

/// The Kubernetes node name a `ClusterMachine` maps to, used by the
/// node-audit controller (spec §4.8).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClusterMachineIdentitySpec {
    pub nodename: String,
}

impl Spec for ClusterMachineIdentitySpec {
    const TYPE: &'static str = "ClusterMachineIdentities.omni.sidero.dev";
}

/// A Kubernetes `Service` annotated for external proxying, projected by the
/// workload-proxy controller (spec §4.9).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExposedServiceSpec {
    pub url: String,
    pub port: u16,
    pub label: Option<String>,
    pub icon_base64: Option<String>,
    pub has_explicit_alias: bool,
}

impl Spec for ExposedServiceSpec {
    const TYPE: &'static str = "ExposedServices.omni.sidero.dev";
}

/// A request for a new machine from an infra provider, created by internal
/// actors and immutable after create (spec §4.3 allocation, §4.6 tenant
/// isolation).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineRequestSpec {
    pub class_name: String,
    pub infra_provider_id: String,
}

impl Spec for MachineRequestSpec {
    const TYPE: &'static str = "MachineRequests.omni.sidero.dev";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum MachineRequestPhase {
    Pending,
    Provisioned,
    Failed,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MachineRequestStatusSpec {
    pub phase: MachineRequestPhase,
    pub machine_id: Option<String>,
}

impl Spec for MachineRequestStatusSpec {
    const TYPE: &'static str = "MachineRequestStatuses.omni.sidero.dev";
}

/// A machine hosted by an infra provider, created by internal actors once a
/// `MachineRequest` is satisfied (spec §4.6).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InfraMachineSpec {
    pub infra_provider_id: String,
    pub class_name: String,
}

impl Spec for InfraMachineSpec {
    const TYPE: &'static str = "InfraMachines.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InfraMachineStatusSpec {
    pub ready: bool,
    pub address: Option<String>,
}

impl Spec for InfraMachineStatusSpec {
    const TYPE: &'static str = "InfraMachineStatuses.omni.sidero.dev";
}

/// The provider's own self-reported health, keyed by its provider ID (spec
/// §4.6: "resource ID must equal the provider ID").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InfraProviderStatusSpec {
    pub name: String,
    pub schema_version: u32,
}

impl Spec for InfraProviderStatusSpec {
    const TYPE: &'static str = "InfraProviderStatuses.omni.sidero.dev";
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InfraProviderHealthStatusSpec {
    pub healthy: bool,
    pub message: Option<String>,
}

impl Spec for InfraProviderHealthStatusSpec {
    const TYPE: &'static str = "InfraProviderHealthStatuses.omni.sidero.dev";
}

/// Well-known label keys used to scope queries across the cluster/machine
/// graph (spec §3.1 "reserved labels encode cluster, machine-set, role,
/// infra-provider ownership").
pub mod labels {
    pub const CLUSTER_ID: &str = "omni.sidero.dev/cluster";
    pub const MACHINE_SET_ID: &str = "omni.sidero.dev/machine-set";
    pub const ROLE: &str = "omni.sidero.dev/role";
    pub const INFRA_PROVIDER_ID: &str = "omni.sidero.dev/infra-provider-id";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_strategy_max_parallelism() {
        assert_eq!(RollingStrategy::Unset.max_parallelism(), None);
        assert_eq!(RollingStrategy::Rolling { max_parallelism: 2 }.max_parallelism(), Some(2));
    }
}
