//! The validation hook a `Store` runs before every `Create`/`Update` (spec
//! §4.1: "schema and invariant validation happens before a write is
//! admitted, never after"). Validators see the untyped [`RawResource`] so
//! a single `Arc<dyn Validator>` can front every resource type in a store,
//! the same "operate on any resource" shape as [`crate::spec::AnyResource`].

use async_trait::async_trait;

use crate::error::{self, Result};
use crate::raw::RawResource;

#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, resource: &RawResource) -> Result<()>;
}

/// Runs a list of validators in order, stopping at the first failure.
pub struct Chain {
    validators: Vec<Box<dyn Validator>>,
}

impl Chain {
    pub fn new(validators: Vec<Box<dyn Validator>>) -> Self {
        Self { validators }
    }
}

#[async_trait]
impl Validator for Chain {
    async fn validate(&self, resource: &RawResource) -> Result<()> {
        for validator in &self.validators {
            validator.validate(resource).await?;
        }
        Ok(())
    }
}

/// Rejects resources whose JSON payload exceeds a byte-size cap (spec §5:
/// the 4 MiB rendered-config cap is the canonical instance of this).
pub struct MaxPayloadSize {
    pub max_bytes: usize,
}

#[async_trait]
impl Validator for MaxPayloadSize {
    async fn validate(&self, resource: &RawResource) -> Result<()> {
        let size = serde_json::to_vec(&resource.payload)
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX);
        if size > self.max_bytes {
            return error::ValidationErrorSnafu {
                reference: resource.metadata.reference(),
                message: format!(
                    "payload is {size} bytes, exceeds cap of {} bytes",
                    self.max_bytes
                ),
            }
            .fail();
        }
        Ok(())
    }
}
