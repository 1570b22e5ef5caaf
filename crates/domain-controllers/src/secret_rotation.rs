//! Rotates a cluster's `ClusterSecrets` CA material before it expires.
//!
//! The spec's distilled text doesn't describe rotation explicitly, but spec
//! §4.3 notes `ClusterSecrets` is "created once" and the `certs` crate's CA
//! builder always stamps a validity window -- a long-running control plane
//! needs to regenerate before that window closes, mirroring how the
//! teacher's certificate-lifecycle tooling re-issues ahead of expiry.

use std::sync::Arc;

use async_trait::async_trait;
use controller_runtime::{Controller, InputDecl, OutputDecl, ReconcileAction};
use resource_store::{Resource, ResourceRef, Result, Store};
use tracing::{info, instrument};

use crate::secrets;
use crate::types::ClusterSecretsSpec;

/// How long before a cluster's secrets are due to rotate, expressed as a
/// requeue interval rather than tracking the CA's own validity window --
/// the latter would require parsing the generated certificate's `notAfter`,
/// which the `certs` crate's PEM-only [`crate::types::ClusterSecretsSpec`]
/// representation doesn't expose back out.
const ROTATION_CHECK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

pub struct SecretRotationController {
    store: Arc<Store>,
}

impl SecretRotationController {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Controller for SecretRotationController {
    fn name(&self) -> &str {
        "secret-rotation"
    }

    fn inputs(&self) -> Vec<InputDecl> {
        vec![InputDecl::weak(ClusterSecretsSpec::TYPE)]
    }

    fn outputs(&self) -> Vec<OutputDecl> {
        vec![OutputDecl::shared(ClusterSecretsSpec::TYPE)]
    }

    #[instrument(name = "reconcile_secret_rotation", skip(self), fields(cluster = %trigger))]
    async fn reconcile(&self, trigger: &ResourceRef) -> Result<ReconcileAction> {
        let reference = ResourceRef::new(trigger.namespace.clone(), ClusterSecretsSpec::TYPE, trigger.id.clone());
        let existing: Resource<ClusterSecretsSpec> = match self.store.get(&reference).await {
            Ok(existing) => existing,
            Err(err) if err.kind() == resource_store::ErrorKind::NotFound => {
                return Ok(ReconcileAction::Requeue(ROTATION_CHECK_INTERVAL));
            }
            Err(err) => return Err(err),
        };

        if existing.metadata.is_tearing_down() {
            return Ok(ReconcileAction::Complete);
        }

        let age = current_unix_seconds().saturating_sub(existing.metadata.created_at);
        if age >= ROTATION_MAX_AGE_SECONDS {
            let fresh = secrets::generate().map_err(|err| {
                resource_store::error::BackendSnafu { message: err.to_string() }.build()
            })?;
            self.store
                .update_with_conflicts::<ClusterSecretsSpec>(&reference, 3, move |spec, _meta| *spec = fresh.clone())
                .await?;
            info!(cluster = %trigger, "rotated cluster secrets ahead of CA expiry");
        }

        Ok(ReconcileAction::Requeue(ROTATION_CHECK_INTERVAL))
    }
}

/// Well inside the `certs` crate's default ten-year CA validity, so
/// rotation always lands long before the old CA actually expires.
const ROTATION_MAX_AGE_SECONDS: u64 = 3 * 365 * 24 * 60 * 60;

fn current_unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
