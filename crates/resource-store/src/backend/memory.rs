//! An in-memory [`Backend`], used for the ephemeral store (spec §4.1:
//! resources that never need to survive a restart) and in tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::metadata::{Namespace, ResourceRef, TypeName};
use crate::raw::RawResource;

use super::Backend;

#[derive(Default)]
pub struct MemoryBackend {
    resources: RwLock<BTreeMap<ResourceRef, RawResource>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, reference: &ResourceRef) -> Result<Option<RawResource>> {
        let resources = self.resources.read().expect("memory backend lock poisoned");
        Ok(resources.get(reference).cloned())
    }

    async fn list(&self, namespace: &Namespace, type_name: &TypeName) -> Result<Vec<RawResource>> {
        let resources = self.resources.read().expect("memory backend lock poisoned");
        Ok(resources
            .values()
            .filter(|r| &r.metadata.namespace == namespace && &r.metadata.type_name == type_name)
            .cloned()
            .collect())
    }

    async fn put(&self, resource: RawResource) -> Result<()> {
        let mut resources = self.resources.write().expect("memory backend lock poisoned");
        resources.insert(resource.metadata.reference(), resource);
        Ok(())
    }

    async fn delete(&self, reference: &ResourceRef) -> Result<()> {
        let mut resources = self.resources.write().expect("memory backend lock poisoned");
        resources.remove(reference);
        Ok(())
    }
}
