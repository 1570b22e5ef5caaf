//! The S3 upload/download surface backups are built on, grounded on
//! `aws-sdk-s3`'s client shape the same way the teacher's `commons::s3`
//! module resolves an `S3ConnectionSpec` into an endpoint/client pair.

use async_trait::async_trait;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use crate::error::{Error, Result};
use crate::types::EtcdBackupS3ConfSpec;

/// Where an etcd snapshot is written to and read from. Kept as a trait so
/// the scheduler/restore paths can be tested against an in-memory fake
/// instead of a real bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ObjectStore {
    pub async fn connect(conf: &EtcdBackupS3ConfSpec) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(Region::new(conf.region.clone()));
        if let Some(endpoint) = &conf.endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let config = loader.load().await;
        Self { client: Client::new(&config), bucket: conf.bucket.clone(), prefix: conf.prefix.clone() }
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix.trim_end_matches('/'), key)
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|err| Error::Upload { cluster_id: key.to_owned(), message: err.to_string() })?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(key))
            .send()
            .await
            .map_err(|err| Error::Download { snapshot_key: key.to_owned(), message: err.to_string() })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| Error::Download { snapshot_key: key.to_owned(), message: err.to_string() })?;

        Ok(bytes.into_bytes().to_vec())
    }
}

/// In-memory fake used by scheduler/restore tests.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: tokio::sync::Mutex<std::collections::HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects.lock().await.insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| crate::error::Error::Download { snapshot_key: key.to_owned(), message: "not found".into() })
    }
}
