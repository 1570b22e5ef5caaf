//! `ClusterSecrets` generation (spec §4.3: "created once, contains the
//! Talos and Kubernetes CA material plus a bootstrap token").

use certs::ca::CertificateAuthority;
use certs::keys::ecdsa;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::error::{Result, SecretsGenerationSnafu};
use crate::types::ClusterSecretsSpec;
use snafu::ResultExt;

/// Length of the randomly generated bootstrap token, in characters.
const BOOTSTRAP_TOKEN_LEN: usize = 32;

/// Generates a fresh `ClusterSecretsSpec`: one ECDSA P-256 CA for the Talos
/// API and a separate one for the Kubernetes API, plus a random bootstrap
/// token used during etcd bootstrap (spec §4.5).
pub fn generate() -> Result<ClusterSecretsSpec> {
    let talos_ca = CertificateAuthority::<ecdsa::SigningKey>::builder_with_ecdsa()
        .build()
        .map_err(|err| err.to_string())
        .context(SecretsGenerationSnafu)?;
    let kubernetes_ca = CertificateAuthority::<ecdsa::SigningKey>::builder_with_ecdsa()
        .build()
        .map_err(|err| err.to_string())
        .context(SecretsGenerationSnafu)?;

    let talos_persisted = talos_ca.to_persisted().map_err(|err| err.to_string()).context(SecretsGenerationSnafu)?;
    let kubernetes_persisted =
        kubernetes_ca.to_persisted().map_err(|err| err.to_string()).context(SecretsGenerationSnafu)?;

    let bootstrap_token = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(BOOTSTRAP_TOKEN_LEN)
        .map(char::from)
        .collect();

    Ok(ClusterSecretsSpec {
        ca_certificate_pem: talos_persisted.certificate_pem,
        ca_private_key_pem: talos_persisted.private_key_pem,
        kubernetes_ca_certificate_pem: kubernetes_persisted.certificate_pem,
        kubernetes_ca_private_key_pem: kubernetes_persisted.private_key_pem,
        bootstrap_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_distinct_talos_and_kubernetes_cas() {
        let secrets = generate().unwrap();
        assert_ne!(secrets.ca_certificate_pem, secrets.kubernetes_ca_certificate_pem);
        assert!(secrets.ca_certificate_pem.contains("BEGIN CERTIFICATE"));
        assert!(secrets.ca_private_key_pem.contains("BEGIN PRIVATE KEY"));
        assert_eq!(secrets.bootstrap_token.len(), BOOTSTRAP_TOKEN_LEN);
    }

    #[test]
    fn bootstrap_tokens_are_not_reused() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a.bootstrap_token, b.bootstrap_token);
    }
}
