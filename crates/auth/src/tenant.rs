//! Infra-provider tenant isolation (spec §4.6).
//!
//! A provider service account may only create a fixed set of status-shaped
//! resource kinds, may only mutate the `Finalizers` field of input kinds it
//! doesn't own, and sees only resources labeled with its own provider ID --
//! everything else reads back as `not-found`, never `permission-denied`,
//! so a provider can't distinguish "not mine" from "doesn't exist" (spec
//! §4.6: "others are filtered out as not-found").

use resource_store::{Labels, Namespace, TypeName};

use crate::error::{self, Result};

/// Resource kinds an infra provider may create directly; every creation is
/// auto-labeled with the provider's own ID (spec §4.6).
pub const PROVIDER_CREATABLE_KINDS: &[&str] = &[
    "MachineRequestStatuses.omni.sidero.dev",
    "InfraMachineStatuses.omni.sidero.dev",
    "InfraProviderStatuses.omni.sidero.dev",
    "InfraProviderHealthStatuses.omni.sidero.dev",
    "ConfigPatchRequests.omni.sidero.dev",
];

/// Resource kinds whose ID must equal the creating provider's own ID (spec
/// §4.6: "additionally require the resource ID to equal the provider ID").
pub const PROVIDER_ID_MUST_MATCH_KINDS: &[&str] =
    &["InfraProviderStatuses.omni.sidero.dev", "InfraProviderHealthStatuses.omni.sidero.dev"];

/// The well-known label every provider-visible resource carries (spec §3.1
/// "reserved labels encode ... infra-provider ownership").
pub const INFRA_PROVIDER_ID_LABEL: &str = "omni.sidero.dev/infra-provider-id";

/// Whether `kind` is one a provider may create directly.
pub fn is_provider_creatable(kind: &TypeName) -> bool {
    PROVIDER_CREATABLE_KINDS.iter().any(|k| *k == kind.0)
}

/// Whether `kind` requires the created resource's ID to equal the
/// provider's own ID.
pub fn requires_id_equals_provider(kind: &TypeName) -> bool {
    PROVIDER_ID_MUST_MATCH_KINDS.iter().any(|k| *k == kind.0)
}

/// The private per-provider namespace a provider may freely define its own
/// resource types in, provided the type string ends with
/// `.<provider-id>.infraprovider.sidero.dev` (spec §4.6).
pub fn private_namespace(provider_id: &str) -> Namespace {
    Namespace::infra_provider(provider_id)
}

pub fn is_private_type_for(kind: &TypeName, provider_id: &str) -> bool {
    kind.0.ends_with(&format!(".{provider_id}.infraprovider.sidero.dev"))
}

/// Checks a provider's attempted `Create` against the isolation rules,
/// returning the labels that must be merged onto the new resource (its own
/// ID auto-labeled with the provider) on success.
pub fn authorize_create(
    provider_id: &str,
    namespace: &Namespace,
    kind: &TypeName,
    resource_id: &str,
) -> Result<Labels> {
    if namespace == &private_namespace(provider_id) {
        if !is_private_type_for(kind, provider_id) {
            return error::PermissionDeniedSnafu {
                message: format!("provider {provider_id} cannot define type {kind} in its own namespace"),
            }
            .fail();
        }
    } else if !is_provider_creatable(kind) {
        return error::PermissionDeniedSnafu {
            message: format!("provider {provider_id} may not create resources of kind {kind}"),
        }
        .fail();
    }

    if requires_id_equals_provider(kind) && resource_id != provider_id {
        return error::PermissionDeniedSnafu {
            message: format!("resource ID must equal the provider ID for kind {kind}"),
        }
        .fail();
    }

    let mut labels = Labels::new();
    labels.insert(INFRA_PROVIDER_ID_LABEL.to_owned(), provider_id.to_owned());
    Ok(labels)
}

/// Checks a provider's attempted `Update`: the spec must be byte-for-byte
/// unchanged (the only legal mutation is adding/removing finalizers), per
/// spec §4.6 "A provider may ... Update input resources only in the
/// `Finalizers` field (with spec unchanged); any other mutation is rejected
/// with `permission-denied`." This asymmetry (no spec-change grace even for
/// an equivalent no-op) is preserved verbatim per spec §9's open question.
pub fn authorize_update_spec_unchanged(spec_changed: bool) -> Result<()> {
    if spec_changed {
        return error::PermissionDeniedSnafu {
            message: "infra providers may only update a resource's Finalizers field".to_owned(),
        }
        .fail();
    }
    Ok(())
}

/// Whether a provider may see a resource carrying `labels` (spec §4.6: "See
/// only resources labeled with its own provider ID"). A caller that gets
/// `false` back must surface `not-found`, not `permission-denied`.
pub fn visible_to_provider(provider_id: &str, labels: &Labels) -> bool {
    labels.get(INFRA_PROVIDER_ID_LABEL).is_some_and(|v| v == provider_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_cannot_create_an_input_kind() {
        let ns = Namespace::default_ns();
        let err = authorize_create("qemu-1", &ns, &TypeName::from("MachineRequests.omni.sidero.dev"), "m1")
            .unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::PermissionDenied);
    }

    #[test]
    fn provider_can_create_its_own_status() {
        let ns = Namespace::default_ns();
        let labels =
            authorize_create("qemu-1", &ns, &TypeName::from("MachineRequestStatuses.omni.sidero.dev"), "m1").unwrap();
        assert_eq!(labels.get(INFRA_PROVIDER_ID_LABEL).unwrap(), "qemu-1");
    }

    #[test]
    fn provider_status_id_must_equal_provider_id() {
        let ns = Namespace::default_ns();
        let err = authorize_create("qemu-1", &ns, &TypeName::from("InfraProviderStatuses.omni.sidero.dev"), "not-qemu-1")
            .unwrap_err();
        assert_eq!(err.kind(), resource_store::ErrorKind::PermissionDenied);

        assert!(authorize_create("qemu-1", &ns, &TypeName::from("InfraProviderStatuses.omni.sidero.dev"), "qemu-1").is_ok());
    }

    #[test]
    fn visibility_is_scoped_to_owning_provider() {
        let mut labels = Labels::new();
        labels.insert(INFRA_PROVIDER_ID_LABEL.to_owned(), "qemu-1".to_owned());
        assert!(visible_to_provider("qemu-1", &labels));
        assert!(!visible_to_provider("aws-2", &labels));
    }

    #[test]
    fn finalizer_only_update_rejects_any_spec_change() {
        assert!(authorize_update_spec_unchanged(false).is_ok());
        assert!(authorize_update_spec_unchanged(true).is_err());
    }

    #[test]
    fn private_namespace_allows_only_its_own_suffix() {
        let ns = private_namespace("qemu-1");
        assert!(authorize_create("qemu-1", &ns, &TypeName::from("Widgets.qemu-1.infraprovider.sidero.dev"), "w1").is_ok());
        assert!(authorize_create("qemu-1", &ns, &TypeName::from("Widgets.aws-2.infraprovider.sidero.dev"), "w1").is_err());
    }
}
