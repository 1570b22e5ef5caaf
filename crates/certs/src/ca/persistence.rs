//! Loading and storing a [`CertificateAuthority`]'s PEM-encoded material
//! through a `resource-store` backend, replacing the teacher's pattern of
//! stashing CA material in a Kubernetes `Secret` with the workspace's own
//! typed resource store (spec.md §3's `ClusterSecrets` entity is exactly
//! this: a CA keypair scoped to a cluster).

use p256::pkcs8::{EncodePrivateKey, LineEnding};
use snafu::{ResultExt, Snafu};
use x509_cert::der::{DecodePem, EncodePem};
use x509_cert::spki::EncodePublicKey;
use x509_cert::Certificate;

use crate::keys::CertificateKeypair;
use crate::CertificatePair;

use super::CertificateAuthority;

#[derive(Debug, Snafu)]
pub enum PersistCaError {
    #[snafu(display("failed to encode certificate as PEM"))]
    EncodeCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to encode private key as PKCS8 PEM"))]
    EncodePrivateKey { source: p256::pkcs8::Error },

    #[snafu(display("failed to decode certificate from PEM"))]
    DecodeCertificate { source: x509_cert::der::Error },

    #[snafu(display("failed to decode private key from PKCS8 PEM"))]
    DecodePrivateKey { source: String },
}

/// The PEM-encoded form of a [`CertificateAuthority`], suitable for storing
/// as a resource payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedCa {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl<SKP> CertificateAuthority<SKP>
where
    SKP: CertificateKeypair,
    <SKP::SigningKey as signature::Keypair>::VerifyingKey: EncodePublicKey,
{
    pub fn to_persisted(&self) -> Result<PersistedCa, PersistCaError>
    where
        SKP::SigningKey: EncodePrivateKey,
    {
        let certificate_pem = self
            .ca_cert()
            .to_pem(LineEnding::LF)
            .context(EncodeCertificateSnafu)?;
        let private_key_pem = self
            .signing_key()
            .to_pkcs8_pem(LineEnding::LF)
            .context(EncodePrivateKeySnafu)?
            .to_string();

        Ok(PersistedCa {
            certificate_pem,
            private_key_pem,
        })
    }

    pub fn from_persisted(persisted: &PersistedCa) -> Result<Self, PersistCaError> {
        let certificate =
            Certificate::from_pem(persisted.certificate_pem.as_bytes()).context(DecodeCertificateSnafu)?;
        let key_pair = SKP::from_pkcs8_pem(&persisted.private_key_pem)
            .map_err(|e| e.to_string())
            .context(DecodePrivateKeySnafu)?;

        Ok(CertificateAuthority::new(CertificatePair {
            certificate,
            key_pair,
        }))
    }
}
