//! A thin adapter showing where a real gRPC transport would plug in. Actual
//! transport wiring and TLS termination are explicitly out of scope (spec
//! §1); everything a caller needs to exercise the pipeline -- parse,
//! verify, authorize, dispatch -- lives in [`crate::middleware::Pipeline`]
//! and is callable in-process without this adapter at all. Kept minimal the
//! same way `tunnel::session` separates the session abstraction from
//! whatever reads and writes the other end of a real socket.

use std::sync::Arc;

use tonic::{Request as TonicRequest, Response as TonicResponse, Status};

use crate::middleware::{Operation, Pipeline, Request, Response};

/// Process-startup requirement for the transport (spec §6): Omni's gRPC
/// stack disables strict ALPN enforcement so older client negotiations
/// still work. Real transport construction would read this once at
/// startup and pass it into whatever TLS acceptor config it builds; since
/// this crate never opens a real listener, the adapter only records the
/// expected setting for the `cli` binary to apply to its own process
/// environment.
pub const GRPC_ENFORCE_ALPN_ENV_VAR: &str = "GRPC_ENFORCE_ALPN_ENABLED";
pub const GRPC_ENFORCE_ALPN_DEFAULT: &str = "false";

/// Returns the value the environment variable above must carry for gRPC
/// clients negotiating without the expected ALPN identifier to still
/// connect.
pub fn required_alpn_enforcement_setting() -> &'static str {
    GRPC_ENFORCE_ALPN_DEFAULT
}

/// A `tonic`-shaped adapter over [`Pipeline`]. Not registered on any
/// `tonic::transport::Server` anywhere in this workspace -- constructing
/// one and calling its methods directly (as the tests below do) is how a
/// caller exercises the "what a real transport would do" path without a
/// socket, TLS, or a running server task.
pub struct ResourceServiceAdapter {
    pipeline: Arc<Pipeline>,
}

impl ResourceServiceAdapter {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// Stands in for a generated `get` RPC handler: unwrap the `tonic`
    /// envelope into a [`Request`], run the pipeline, wrap the result back
    /// up as a `tonic` response or status.
    pub async fn get(&self, request: TonicRequest<GetResourceRequest>) -> Result<TonicResponse<ResourcePayload>, Status> {
        let body = request.into_inner();
        let pipeline_request = Request {
            transport: auth::Transport::Network,
            signature: body.signature,
            kind: body.kind.clone(),
            verb: auth::Verb::Read,
            target_cluster: body.target_cluster,
            operation: Operation::Get(resource_store::ResourceRef::new(
                resource_store::Namespace::from(body.namespace),
                body.kind,
                body.id,
            )),
        };

        match self.pipeline.handle(pipeline_request).await {
            Ok(Response::Resource(raw)) => Ok(TonicResponse::new(ResourcePayload {
                payload_json: raw.payload.to_string(),
                version: raw.metadata.version.0,
            })),
            Ok(_) => Err(Status::internal("unexpected response shape for a Get dispatch")),
            Err(err) => Err(status_from_kind(err.kind())),
        }
    }
}

/// The minimal request/response shapes a generated `tonic` service would
/// carry over the wire; hand-written here since no `.proto` is compiled in
/// this workspace (spec §1's transport exclusion).
pub struct GetResourceRequest {
    pub namespace: String,
    pub kind: String,
    pub id: String,
    pub target_cluster: Option<String>,
    pub signature: Option<auth::Signature>,
}

pub struct ResourcePayload {
    pub payload_json: String,
    pub version: u64,
}

fn status_from_kind(kind: resource_store::ErrorKind) -> Status {
    use resource_store::ErrorKind;
    match kind {
        ErrorKind::NotFound => Status::not_found("resource not found"),
        ErrorKind::AlreadyExists => Status::already_exists("resource already exists"),
        ErrorKind::Conflict | ErrorKind::OwnerConflict => Status::aborted("conflicting concurrent update"),
        ErrorKind::Precondition => Status::failed_precondition("precondition not met"),
        ErrorKind::ValidationError | ErrorKind::InvalidArgument => Status::invalid_argument("request failed validation"),
        ErrorKind::PermissionDenied => Status::permission_denied("not authorized"),
        ErrorKind::Unauthenticated => Status::unauthenticated("signature missing or invalid"),
        ErrorKind::Unsupported => Status::unimplemented("operation not supported"),
        ErrorKind::Unavailable => Status::unavailable("backend unavailable"),
        ErrorKind::Cancelled => Status::cancelled("request cancelled"),
    }
}
