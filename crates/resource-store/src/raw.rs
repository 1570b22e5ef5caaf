//! The untyped `(Metadata, payload)` representation the backend, watch
//! machinery, and cross-tenant proxying operate on (spec §9, "Dynamic-typed
//! resource payloads -> tagged variants"). Typed callers go through
//! [`crate::spec::Resource`] and serialize/deserialize at the boundary.

use snafu::ResultExt;

use crate::error::{self, Error};
use crate::metadata::Metadata;
use crate::spec::{Resource, Spec};

#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RawResource {
    pub metadata: Metadata,
    pub payload: serde_json::Value,
}

impl RawResource {
    pub fn from_typed<S: Spec>(resource: &Resource<S>) -> Result<Self, Error> {
        let payload = serde_json::to_value(&resource.spec).context(error::SerializationSnafu {
            reference: resource.metadata.reference(),
        })?;
        Ok(Self {
            metadata: resource.metadata.clone(),
            payload,
        })
    }

    pub fn into_typed<S: Spec>(self) -> Result<Resource<S>, Error> {
        let reference = self.metadata.reference();
        let spec = serde_json::from_value(self.payload)
            .context(error::SerializationSnafu { reference })?;
        Ok(Resource::new(self.metadata, spec))
    }
}
