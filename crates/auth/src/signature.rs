//! Payload-scoped request signature verification (spec §4.7): every request
//! carries a `Signature{keyId, payload, base64Sig}` over
//! `{method, headers, timestamp}`, verified against the signer's
//! self-signed OpenPGP key.

use base64::Engine as _;
use sequoia_openpgp as openpgp;
use openpgp::cert::Cert;
use openpgp::parse::stream::{DetachedVerifierBuilder, MessageLayer, MessageStructure, VerificationHelper};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::KeyHandle;

use crate::error::{self, Result};

/// Users' self-signed keys may not claim a lifetime longer than this (spec
/// §4.7: "A public key is accepted if its self-signed key lifetime is <=
/// `ServiceAccountMaxAllowedLifetime` (<= 8 h for users)"). Service accounts
/// (non-user identities) are not bound by this cap.
pub const SERVICE_ACCOUNT_MAX_ALLOWED_LIFETIME_SECS: u64 = 8 * 60 * 60;

/// The payload a request signature covers: `{method, headers, timestamp}`
/// (spec §4.7), flattened into canonical bytes by the caller before
/// signing/verifying.
#[derive(Clone, Debug)]
pub struct SignedPayload {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub timestamp: u64,
}

impl SignedPayload {
    /// A deterministic byte encoding of the payload, canonical enough that
    /// signer and verifier always agree on what was signed.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut out = format!("{}\n{}\n", self.method, self.timestamp).into_bytes();
        for (k, v) in &self.headers {
            out.extend_from_slice(k.as_bytes());
            out.push(b':');
            out.extend_from_slice(v.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

/// A request's `Signature{keyId, payload, base64Sig}` header tuple.
#[derive(Clone, Debug)]
pub struct Signature {
    pub key_id: String,
    pub payload: SignedPayload,
    pub signature_base64: String,
}

#[derive(Debug)]
struct UnexpectedMessageLayer;

impl std::fmt::Display for UnexpectedMessageLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("unexpected OpenPGP message layer in a detached signature")
    }
}

impl std::error::Error for UnexpectedMessageLayer {}

struct SingleCertHelper<'a> {
    cert: &'a Cert,
}

impl VerificationHelper for SingleCertHelper<'_> {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(vec![self.cert.clone()])
    }

    fn check(&mut self, structure: MessageStructure) -> openpgp::Result<()> {
        for layer in structure.into_iter() {
            match layer {
                MessageLayer::SignatureGroup { results } => {
                    for result in results {
                        result?;
                    }
                }
                _ => return Err(UnexpectedMessageLayer.into()),
            }
        }
        Ok(())
    }
}

/// Verifies `signature` was produced over `signature.payload` by a key in
/// `cert` (spec §4.7 step 1, the signature-verification half of identity
/// resolution).
pub fn verify(cert: &Cert, signature: &Signature) -> Result<()> {
    let policy = StandardPolicy::new();
    let sig_bytes = base64::engine::general_purpose::STANDARD
        .decode(&signature.signature_base64)
        .map_err(|err| error::Error::MalformedSignature { message: err.to_string() })?;

    let helper = SingleCertHelper { cert };
    let mut verifier = DetachedVerifierBuilder::from_bytes(&sig_bytes)
        .map_err(|err| error::Error::MalformedSignature { message: err.to_string() })?
        .with_policy(&policy, None, helper)
        .map_err(|err| error::Error::MalformedSignature { message: err.to_string() })?;

    verifier
        .verify_bytes(signature.payload.canonical_bytes())
        .map_err(|err| error::Error::Unauthenticated { message: format!("signature verification failed: {err}") })
}

/// The self-signed key lifetime, i.e. how long after its creation time the
/// primary key's own binding signature allows it to remain valid. `None`
/// means the key never expires, which this function reports as an
/// unbounded lifetime (rejected by [`enforce_user_key_lifetime`]).
pub fn self_signed_key_lifetime_secs(cert: &Cert) -> Result<Option<u64>> {
    let policy = StandardPolicy::new();
    let vka = cert
        .primary_key()
        .with_policy(&policy, None)
        .map_err(|err| error::Error::MalformedSignature { message: err.to_string() })?;

    let creation_time = vka.creation_time();
    Ok(vka.key_expiration_time().map(|expiry| {
        expiry
            .duration_since(creation_time)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }))
}

/// Enforces spec §4.7's user key-lifetime cap. Non-user (service account)
/// identities are not subject to this check.
pub fn enforce_user_key_lifetime(cert: &Cert) -> Result<()> {
    match self_signed_key_lifetime_secs(cert)? {
        Some(lifetime) if lifetime <= SERVICE_ACCOUNT_MAX_ALLOWED_LIFETIME_SECS => Ok(()),
        Some(lifetime) => Err(error::Error::Unauthenticated {
            message: format!(
                "key self-signed lifetime of {lifetime}s exceeds the {SERVICE_ACCOUNT_MAX_ALLOWED_LIFETIME_SECS}s cap for users"
            ),
        }),
        None => Err(error::Error::Unauthenticated {
            message: "key has no expiration; users must self-sign a bounded lifetime".to_owned(),
        }),
    }
}
