//! The backup/restore entity family (spec §3.1, §4.5).

use resource_store::Spec;
use serde::{Deserialize, Serialize};

/// Where a cluster's etcd snapshots are uploaded. Admin-only to create or
/// read (spec §4.7: "admin-only resources ... EtcdBackupS3Conf").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EtcdBackupS3ConfSpec {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub prefix: String,
}

impl Spec for EtcdBackupS3ConfSpec {
    const TYPE: &'static str = "EtcdBackupS3Confs.omni.sidero.dev";
}

/// A recorded backup artifact. `id` is the unix-second timestamp it was
/// taken at, so listing newest-first by ID is listing newest-first by time
/// (spec §4.5: "listing is newest-first by name, which is a unix-second
/// timestamp").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EtcdBackupSpec {
    pub cluster_id: String,
    pub snapshot_key: String,
    pub taken_at: u64,
}

impl Spec for EtcdBackupSpec {
    const TYPE: &'static str = "EtcdBackups.omni.sidero.dev";
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum BackupHealth {
    Ok,
    Error,
}

/// Per-cluster backup status (spec §4.5 "Status surface").
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EtcdBackupStatusSpec {
    pub status: BackupHealth,
    pub last_backup_time: Option<u64>,
    pub last_backup_attempt: Option<u64>,
    pub error: Option<String>,
}

impl Spec for EtcdBackupStatusSpec {
    const TYPE: &'static str = "EtcdBackupStatuses.omni.sidero.dev";
}

/// Rolled-up summary across every cluster's `EtcdBackupStatus` (spec §4.5).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EtcdBackupOverallStatusSpec {
    pub clusters_ok: u32,
    pub clusters_erroring: u32,
}

impl Spec for EtcdBackupOverallStatusSpec {
    const TYPE: &'static str = "EtcdBackupOverallStatuses.omni.sidero.dev";
}

/// Triggers an immediate out-of-schedule backup (spec §4.5).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EtcdManualBackupSpec {
    pub cluster_id: String,
    pub backup_at: u64,
}

impl Spec for EtcdManualBackupSpec {
    const TYPE: &'static str = "EtcdManualBackups.omni.sidero.dev";
}
