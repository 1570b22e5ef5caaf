//! The domain reconcilers built on `controller-runtime`: `Cluster`,
//! `MachineSet`, `ClusterMachine` teardown, Kubernetes node audit, the
//! workload proxy, infra-provider-backed allocation, `ClusterSecrets`
//! generation/rotation, and the Talos/Kubernetes upgrade trackers (spec
//! §2 item 4, §4.3, §4.6, §4.8, §4.9).

pub mod cluster;
pub mod cluster_machine;
pub mod error;
pub mod infra;
pub mod kubernetes_upgrade;
pub mod machine_set;
pub mod node_audit;
pub mod secret_rotation;
pub mod secrets;
pub mod talos_upgrade;
pub mod types;
pub mod workload_proxy;

pub use cluster::ClusterController;
pub use cluster_machine::{ClusterMachineController, DrainOutcome, NodeDrainer};
pub use error::{Error, Result};
pub use infra::InfraAllocationController;
pub use kubernetes_upgrade::KubernetesUpgradeController;
pub use machine_set::MachineSetController;
pub use node_audit::{KubernetesNodeLister, NodeAuditController};
pub use secret_rotation::SecretRotationController;
pub use talos_upgrade::TalosUpgradeController;
pub use workload_proxy::{ServiceLister, WatchedService, WorkloadProxyController};
