//! The apply protocol (spec §4.4): SHA-256 short-circuit, reboot-requiring
//! field detection, and the invalid-config non-rebooting retry path.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::types::{ApplyMode, ClusterMachineConfigStatus};

/// Pushes a rendered config to a machine's tunnel endpoint (spec §4.4 step
/// 3). Kept as a trait so `config-render` never depends on the `tunnel`
/// crate; the tunnel listener implements this to bridge the two.
#[async_trait]
pub trait ConfigPusher: Send + Sync {
    async fn push(&self, machine_id: &str, rendered: &serde_yaml::Value, mode: ApplyMode) -> Result<()>;
}

/// Fields whose change requires a reboot to take effect (spec §4.4 step 3:
/// "installer image, encryption, platform network").
const REBOOT_REQUIRING_PATHS: &[&[&str]] = &[
    &["machine", "install", "image"],
    &["machine", "systemDiskEncryption"],
    &["machine", "network"],
];

fn get_path<'a>(value: &'a serde_yaml::Value, path: &[&str]) -> &'a serde_yaml::Value {
    let mut current = value;
    for segment in path {
        current = current.get(segment).unwrap_or(&serde_yaml::Value::Null);
    }
    current
}

/// Whether the diff between `old` and `new` touches any reboot-requiring
/// field.
pub fn requires_reboot(old: &serde_yaml::Value, new: &serde_yaml::Value) -> bool {
    REBOOT_REQUIRING_PATHS
        .iter()
        .any(|path| get_path(old, path) != get_path(new, path))
}

/// SHA-256 hex digest of a rendered config, computed over its canonical YAML
/// serialization (spec §4.4 step 1).
pub fn compute_sha256(rendered: &serde_yaml::Value) -> Result<String> {
    let bytes = serde_yaml::to_string(rendered).map_err(|source| crate::error::Error::InvalidYaml { source })?;
    let digest = Sha256::digest(bytes.as_bytes());
    Ok(hex::encode(digest))
}

/// What an apply cycle should do, given the newly rendered config and the
/// previously observed status.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ApplyDecision {
    /// The rendered config's SHA matches what's already applied (spec
    /// §4.4 step 2).
    NoOp,
    Apply { mode: ApplyMode, sha256: String },
}

/// Decides what an apply cycle should do (spec §4.4 steps 1-3).
/// `previous_rendered` is the last `ClusterMachineConfig.rendered` this
/// member had (`None` on first apply, which is always `Immediate`).
pub fn decide(
    previous_rendered: Option<&serde_yaml::Value>,
    new_rendered: &serde_yaml::Value,
    status: &ClusterMachineConfigStatus,
) -> Result<ApplyDecision> {
    let sha256 = compute_sha256(new_rendered)?;
    if status.last_applied_sha256.as_deref() == Some(sha256.as_str()) {
        return Ok(ApplyDecision::NoOp);
    }

    let mode = match previous_rendered {
        None => ApplyMode::Immediate,
        Some(previous) if requires_reboot(previous, new_rendered) => ApplyMode::Reboot,
        Some(_) => ApplyMode::Immediate,
    };

    Ok(ApplyDecision::Apply { mode, sha256 })
}

/// Records an apply failure without advancing the applied SHA and without
/// requesting a reboot (spec §4.4 step 5: "record the error in status and
/// do not reboot").
pub fn record_failure(status: &mut ClusterMachineConfigStatus, message: String) {
    status.last_error = Some(message);
}

/// Records a successful apply: advances the SHA/mode and clears any prior
/// error.
pub fn record_success(status: &mut ClusterMachineConfigStatus, sha256: String, mode: ApplyMode) {
    status.last_applied_sha256 = Some(sha256);
    status.last_applied_mode = Some(mode);
    status.last_error = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn first_apply_is_always_immediate() {
        let status = ClusterMachineConfigStatus::default();
        let new = yaml("machine:\n  install:\n    image: foo\n");
        let decision = decide(None, &new, &status).unwrap();
        assert!(matches!(decision, ApplyDecision::Apply { mode: ApplyMode::Immediate, .. }));
    }

    #[test]
    fn unchanged_sha_is_a_noop() {
        let new = yaml("machine:\n  hostname: a\n");
        let sha256 = compute_sha256(&new).unwrap();
        let mut status = ClusterMachineConfigStatus::default();
        status.last_applied_sha256 = Some(sha256);

        assert_eq!(decide(Some(&new), &new, &status).unwrap(), ApplyDecision::NoOp);
    }

    #[test]
    fn installer_image_change_requires_reboot() {
        let old = yaml("machine:\n  install:\n    image: v1\n");
        let new = yaml("machine:\n  install:\n    image: v2\n");
        let status = ClusterMachineConfigStatus::default();
        let decision = decide(Some(&old), &new, &status).unwrap();
        assert!(matches!(decision, ApplyDecision::Apply { mode: ApplyMode::Reboot, .. }));
    }

    #[test]
    fn unrelated_field_change_applies_immediately() {
        let old = yaml("machine:\n  hostname: a\n");
        let new = yaml("machine:\n  hostname: b\n");
        let status = ClusterMachineConfigStatus::default();
        let decision = decide(Some(&old), &new, &status).unwrap();
        assert!(matches!(decision, ApplyDecision::Apply { mode: ApplyMode::Immediate, .. }));
    }

    #[test]
    fn failure_records_error_without_touching_applied_sha() {
        let mut status = ClusterMachineConfigStatus::default();
        status.last_applied_sha256 = Some("abc".into());
        record_failure(&mut status, "bad disk selector".into());
        assert_eq!(status.last_applied_sha256.as_deref(), Some("abc"));
        assert_eq!(status.last_error.as_deref(), Some("bad disk selector"));
    }
}
