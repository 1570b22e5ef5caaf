//! Etcd snapshot scheduling, S3 upload, and cross-cluster restore (spec
//! §4.5): a per-cluster backup schedule driven by `BackupConfiguration`,
//! manual out-of-schedule backups via `EtcdManualBackup`, and restoring a
//! fresh cluster from another's most recent snapshot via
//! `RestoreFromEtcdBackupClusterID`.

pub mod error;
pub mod object_store;
pub mod restore;
pub mod scheduler;
pub mod types;

pub use error::{Error, Result};
pub use object_store::{MemoryObjectStore, ObjectStore, S3ObjectStore};
pub use scheduler::{EtcdBackupScheduler, EtcdSnapshotter};
pub use types::{
    BackupHealth, EtcdBackupOverallStatusSpec, EtcdBackupS3ConfSpec, EtcdBackupSpec, EtcdBackupStatusSpec,
    EtcdManualBackupSpec,
};
