//! The persistent [`Backend`], backed by `rocksdb`.
//!
//! Keys are the `ResourceRef` display form (`namespace/type/id`); values are
//! the `RawResource` serialized as JSON. `rocksdb`'s API is synchronous, so
//! every call is dispatched through `spawn_blocking` to keep the async store
//! responsive.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{IteratorMode, DB};
use snafu::ResultExt;

use crate::error::{self, Error, Result};
use crate::metadata::{Namespace, ResourceRef, TypeName};
use crate::raw::RawResource;

use super::Backend;

pub struct RocksBackend {
    db: Arc<DB>,
}

impl RocksBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = DB::open_default(path).map_err(|e| Error::Backend {
            message: format!("opening rocksdb: {e}"),
        })?;
        Ok(Self { db: Arc::new(db) })
    }

    fn key(reference: &ResourceRef) -> Vec<u8> {
        reference.to_string().into_bytes()
    }

    fn prefix(namespace: &Namespace, type_name: &TypeName) -> Vec<u8> {
        format!("{namespace}/{type_name}/").into_bytes()
    }
}

#[async_trait]
impl Backend for RocksBackend {
    async fn get(&self, reference: &ResourceRef) -> Result<Option<RawResource>> {
        let db = self.db.clone();
        let key = Self::key(reference);
        let reference = reference.clone();
        tokio::task::spawn_blocking(move || {
            let Some(bytes) = db.get(&key).map_err(|e| Error::Backend {
                message: format!("reading from rocksdb: {e}"),
            })?
            else {
                return Ok(None);
            };
            let resource: RawResource =
                serde_json::from_slice(&bytes).context(error::SerializationSnafu { reference })?;
            Ok(Some(resource))
        })
        .await
        .map_err(|e| Error::Backend {
            message: format!("rocksdb task panicked: {e}"),
        })?
    }

    async fn list(&self, namespace: &Namespace, type_name: &TypeName) -> Result<Vec<RawResource>> {
        let db = self.db.clone();
        let prefix = Self::prefix(namespace, type_name);
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for item in db.iterator(IteratorMode::From(&prefix, rocksdb::Direction::Forward)) {
                let (key, value) = item.map_err(|e| Error::Backend {
                    message: format!("iterating rocksdb: {e}"),
                })?;
                if !key.starts_with(&prefix) {
                    break;
                }
                let resource: RawResource = serde_json::from_slice(&value).map_err(|e| {
                    Error::Backend {
                        message: format!("decoding rocksdb value: {e}"),
                    }
                })?;
                out.push(resource);
            }
            Ok(out)
        })
        .await
        .map_err(|e| Error::Backend {
            message: format!("rocksdb task panicked: {e}"),
        })?
    }

    async fn put(&self, resource: RawResource) -> Result<()> {
        let db = self.db.clone();
        let key = Self::key(&resource.metadata.reference());
        let reference = resource.metadata.reference();
        let bytes =
            serde_json::to_vec(&resource).context(error::SerializationSnafu { reference })?;
        tokio::task::spawn_blocking(move || {
            db.put(&key, &bytes).map_err(|e| Error::Backend {
                message: format!("writing to rocksdb: {e}"),
            })
        })
        .await
        .map_err(|e| Error::Backend {
            message: format!("rocksdb task panicked: {e}"),
        })?
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<()> {
        let db = self.db.clone();
        let key = Self::key(reference);
        tokio::task::spawn_blocking(move || {
            db.delete(&key).map_err(|e| Error::Backend {
                message: format!("deleting from rocksdb: {e}"),
            })
        })
        .await
        .map_err(|e| Error::Backend {
            message: format!("rocksdb task panicked: {e}"),
        })?
    }
}
