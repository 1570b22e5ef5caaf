//! The fixed-order request middleware pipeline (spec §9: "parse -> verify
//! signature -> resolve identity -> apply ACL -> dispatch"), composing
//! `auth`'s signature verification and authorization decision with a
//! [`ResourceProxy`] dispatch target.

use std::sync::Arc;

use tokio::sync::mpsc;

use auth::{Signature, Transport, Verb};
use resource_store::{Labels, Namespace, RawResource, ResourceRef, TypeName, Version, WatchEvent, WatchOptions};
use resource_store::selector::LabelQuery;

use crate::directory::{IdentityDirectory, PolicyDirectory};
use crate::error::Result;
use crate::resource_proxy::ResourceProxy;

/// The already-parsed shape of an inbound call (the "parse" stage: a real
/// transport adapter turns wire bytes/headers into this before handing off
/// to [`Pipeline::handle`]).
pub struct Request {
    pub transport: Transport,
    /// `None` for an unsigned request; only ever accepted on the loopback
    /// transport for a denylist-gated read (spec §4.7).
    pub signature: Option<Signature>,
    pub kind: String,
    pub verb: Verb,
    pub target_cluster: Option<String>,
    pub operation: Operation,
}

pub enum Operation {
    Get(ResourceRef),
    List { namespace: Namespace, type_name: TypeName, query: LabelQuery },
    Create { reference: ResourceRef, payload: serde_json::Value, labels: Labels },
    Update { reference: ResourceRef, expected_version: Version, payload: serde_json::Value },
    Teardown(ResourceRef),
    Destroy(ResourceRef),
    WatchKind { namespace: Namespace, type_name: TypeName, labels: Labels, options: WatchOptions },
}

pub enum Response {
    Resource(RawResource),
    List(Vec<RawResource>),
    Empty,
    Watch(mpsc::Receiver<WatchEvent>),
}

/// Composes identity/policy lookups with a dispatch target behind the
/// spec §4.7 authorization decision.
pub struct Pipeline {
    identities: Arc<dyn IdentityDirectory>,
    policies: Arc<dyn PolicyDirectory>,
    proxy: Arc<dyn ResourceProxy>,
}

impl Pipeline {
    pub fn new(
        identities: Arc<dyn IdentityDirectory>,
        policies: Arc<dyn PolicyDirectory>,
        proxy: Arc<dyn ResourceProxy>,
    ) -> Self {
        Self { identities, policies, proxy }
    }

    /// Runs the full pipeline. `request` has already been parsed by the
    /// transport adapter; this covers verify -> resolve -> ACL -> dispatch.
    #[tracing::instrument(skip_all, fields(kind = %request.kind, verb = ?request.verb))]
    pub async fn handle(&self, request: Request) -> Result<Response> {
        let (identity_key, signed) = match &request.signature {
            Some(signature) => {
                let resolved = self
                    .identities
                    .resolve(&signature.key_id)
                    .await
                    .ok_or_else(|| auth::Error::Unauthenticated {
                        message: format!("unknown signing key {}", signature.key_id),
                    })?;
                auth::signature::verify(&resolved.cert, signature)?;
                if resolved.is_user {
                    auth::signature::enforce_user_key_lifetime(&resolved.cert)?;
                }
                (resolved.identity_key, true)
            }
            None => (String::new(), false),
        };

        let base_role = if signed {
            self.policies.base_role(&identity_key).await
        } else {
            auth::Role::None
        };
        let policy = if signed { self.policies.access_policy(&identity_key).await } else { None };

        let auth_request = auth::AuthorizationRequest {
            transport: request.transport,
            signed,
            identity_key: identity_key.clone(),
            base_role,
            policy: policy.as_ref(),
            target_cluster: request.target_cluster.as_deref(),
            kind: &request.kind,
            verb: request.verb,
        };
        auth::authorize(&auth_request)?;

        self.dispatch(request.operation).await
    }

    async fn dispatch(&self, operation: Operation) -> Result<Response> {
        match operation {
            Operation::Get(reference) => Ok(Response::Resource(self.proxy.get(&reference).await?)),
            Operation::List { namespace, type_name, query } => {
                Ok(Response::List(self.proxy.list(&namespace, &type_name, &query).await?))
            }
            Operation::Create { reference, payload, labels } => {
                Ok(Response::Resource(self.proxy.create(reference, payload, labels).await?))
            }
            Operation::Update { reference, expected_version, payload } => {
                Ok(Response::Resource(self.proxy.update(&reference, expected_version, payload).await?))
            }
            Operation::Teardown(reference) => {
                self.proxy.teardown(&reference).await?;
                Ok(Response::Empty)
            }
            Operation::Destroy(reference) => {
                self.proxy.destroy(&reference).await?;
                Ok(Response::Empty)
            }
            Operation::WatchKind { namespace, type_name, labels, options } => {
                Ok(Response::Watch(self.proxy.watch_kind(&namespace, &type_name, labels, options).await?))
            }
        }
    }
}

impl Response {
    pub fn into_resource(self) -> Option<RawResource> {
        match self {
            Response::Resource(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use sequoia_openpgp::cert::CertBuilder;
    use sequoia_openpgp::serialize::stream::{Message, Signer};
    use sequoia_openpgp::policy::StandardPolicy;

    use resource_store::backend::memory::MemoryBackend;
    use resource_store::Store;

    use crate::directory::ResolvedIdentity;
    use crate::resource_proxy::InProcessResourceProxy;

    use super::*;

    struct FixedIdentities(std::collections::HashMap<String, ResolvedIdentity>);

    #[async_trait]
    impl IdentityDirectory for FixedIdentities {
        async fn resolve(&self, key_id: &str) -> Option<ResolvedIdentity> {
            self.0.get(key_id).map(|r| ResolvedIdentity {
                cert: r.cert.clone(),
                identity_key: r.identity_key.clone(),
                is_user: r.is_user,
            })
        }
    }

    struct FixedPolicies {
        base_role: auth::Role,
    }

    #[async_trait]
    impl PolicyDirectory for FixedPolicies {
        async fn base_role(&self, _identity_key: &str) -> auth::Role {
            self.base_role
        }

        async fn access_policy(&self, _identity_key: &str) -> Option<auth::AccessPolicySpec> {
            None
        }
    }

    fn sign(cert: &sequoia_openpgp::Cert, payload: &auth::SignedPayload) -> Signature {
        use base64::Engine as _;
        let policy = StandardPolicy::new();
        let keypair = cert
            .primary_key()
            .with_policy(&policy, None)
            .unwrap()
            .key()
            .clone()
            .parts_into_secret()
            .unwrap()
            .into_keypair()
            .unwrap();

        let mut sink = Vec::new();
        {
            let message = Message::new(&mut sink);
            let mut signer = Signer::new(message, keypair).detached().build().unwrap();
            std::io::Write::write_all(&mut signer, &payload.canonical_bytes()).unwrap();
            signer.finalize().unwrap();
        }

        Signature {
            key_id: "alice".into(),
            payload: payload.clone(),
            signature_base64: base64::engine::general_purpose::STANDARD.encode(&sink),
        }
    }

    fn short_lived_cert() -> sequoia_openpgp::Cert {
        CertBuilder::general_purpose(None, Some("alice@example.com"))
            .set_validity_period(std::time::Duration::from_secs(3600))
            .generate()
            .unwrap()
            .0
    }

    fn pipeline_with(base_role: auth::Role, cert: sequoia_openpgp::Cert, is_user: bool) -> (Pipeline, sequoia_openpgp::Cert) {
        let store = Arc::new(Store::new(Arc::new(MemoryBackend::new())));
        let proxy: Arc<dyn ResourceProxy> = Arc::new(InProcessResourceProxy::new(store));
        let mut identities = std::collections::HashMap::new();
        identities.insert(
            "alice".to_owned(),
            ResolvedIdentity { cert: cert.clone(), identity_key: "alice@example.com".into(), is_user },
        );
        let pipeline = Pipeline::new(
            Arc::new(FixedIdentities(identities)),
            Arc::new(FixedPolicies { base_role }),
            proxy,
        );
        (pipeline, cert)
    }

    #[tokio::test]
    async fn signed_request_from_a_sufficiently_privileged_reader_is_dispatched() {
        let cert = short_lived_cert();
        let (pipeline, cert) = pipeline_with(auth::Role::Reader, cert, true);

        let payload = auth::SignedPayload { method: "Get".into(), headers: vec![], timestamp: 0 };
        let signature = sign(&cert, &payload);

        let reference = ResourceRef::new(Namespace::from("default"), "Namespaces.omni.sidero.dev", "default");
        pipeline
            .proxy
            .create(reference.clone(), serde_json::json!({}), Labels::new())
            .await
            .unwrap();

        let request = Request {
            transport: Transport::Network,
            signature: Some(signature),
            kind: "Namespaces.omni.sidero.dev".into(),
            verb: Verb::Read,
            target_cluster: None,
            operation: Operation::Get(reference),
        };

        let response = pipeline.handle(request).await.unwrap();
        assert!(response.into_resource().is_some());
    }

    #[tokio::test]
    async fn insufficient_role_is_rejected_before_dispatch() {
        let cert = short_lived_cert();
        let (pipeline, cert) = pipeline_with(auth::Role::Reader, cert, true);

        let payload = auth::SignedPayload { method: "Create".into(), headers: vec![], timestamp: 0 };
        let signature = sign(&cert, &payload);

        let reference = ResourceRef::new(Namespace::from("default"), "Clusters.omni.sidero.dev", "c1");
        let request = Request {
            transport: Transport::Network,
            signature: Some(signature),
            kind: "Clusters.omni.sidero.dev".into(),
            verb: Verb::Write,
            target_cluster: None,
            operation: Operation::Create { reference, payload: serde_json::json!({}), labels: Labels::new() },
        };

        let err = pipeline.handle(request).await.unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn unsigned_network_request_is_unauthenticated() {
        let cert = short_lived_cert();
        let (pipeline, _cert) = pipeline_with(auth::Role::Admin, cert, true);

        let reference = ResourceRef::new(Namespace::from("default"), "Clusters.omni.sidero.dev", "c1");
        let request = Request {
            transport: Transport::Network,
            signature: None,
            kind: "Clusters.omni.sidero.dev".into(),
            verb: Verb::Read,
            target_cluster: None,
            operation: Operation::Get(reference),
        };

        let err = pipeline.handle(request).await.unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::Unauthenticated);
    }
}
