//! Store backend selection, generalizing the teacher's `ProductConfigPath`
//! pattern (a path-shaped argument with defaulting/resolution behavior) to
//! this workspace's choice between the ephemeral in-memory backend and the
//! persistent RocksDB-backed one.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, ValueEnum};
use resource_store::backend::memory::MemoryBackend;
use resource_store::backend::rocksdb_backend::RocksBackend;
use resource_store::backend::Backend;
use snafu::Snafu;

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct StoreArgs {
    /// Which resource-store backend to run against.
    #[arg(long, env, value_enum, default_value = "memory")]
    pub backend: StoreBackendKind,

    /// Path to the RocksDB data directory. Required when `--backend=rocksdb`.
    #[arg(long, env)]
    pub store_path: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendKind {
    Memory,
    Rocksdb,
}

#[derive(Debug, Snafu)]
pub enum OpenBackendError {
    #[snafu(display("--store-path is required when --backend=rocksdb"))]
    MissingStorePath,

    #[snafu(display("failed to open the rocksdb backend"))]
    Rocksdb { source: resource_store::Error },
}

impl StoreArgs {
    /// Opens the selected backend. RocksDB's own open call is synchronous;
    /// it runs here on whatever thread the caller is on, the same as every
    /// other one-time startup step in this binary.
    pub fn open(&self) -> Result<Arc<dyn Backend>, OpenBackendError> {
        match self.backend {
            StoreBackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
            StoreBackendKind::Rocksdb => {
                let path = self.store_path.clone().ok_or(OpenBackendError::MissingStorePath)?;
                let backend = RocksBackend::open(&path).map_err(|source| OpenBackendError::Rocksdb { source })?;
                Ok(Arc::new(backend))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn memory_backend_opens_without_a_path() {
        let args = StoreArgs { backend: StoreBackendKind::Memory, store_path: None };
        assert!(args.open().is_ok());
    }

    #[test]
    fn rocksdb_backend_requires_a_path() {
        let args = StoreArgs { backend: StoreBackendKind::Rocksdb, store_path: None };
        assert!(matches!(args.open(), Err(OpenBackendError::MissingStorePath)));
    }

    #[test]
    fn rocksdb_backend_opens_at_a_given_path() {
        let dir = tempdir().expect("create temporary directory");
        let args = StoreArgs { backend: StoreBackendKind::Rocksdb, store_path: Some(dir.path().to_path_buf()) };
        assert!(args.open().is_ok());
    }
}
