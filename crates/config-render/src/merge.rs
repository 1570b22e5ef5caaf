//! Generic deep-merge over `serde_yaml::Value`, the same semantics the
//! teacher applies over typed Kubernetes resources via
//! `k8s_openapi::DeepMerge` (maps merge recursively key-by-key, sequences
//! and scalars are replaced wholesale) but expressed over an untyped YAML
//! tree since a `ConfigPatch` has no fixed schema.

use serde_yaml::Value;

/// Merges `patch` into `base` in place. Mapping keys merge recursively;
/// anything else (sequences, scalars, a mapping overwritten by a non-mapping
/// or vice versa) is replaced by the patch's value.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Mapping(base_map), Value::Mapping(patch_map)) => {
            for (key, patch_value) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, patch_value),
                    None => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => {
            *base = patch.clone();
        }
    }
}

/// Merges a sequence of patches into `base`, in order.
pub fn deep_merge_all<'a>(base: &mut Value, patches: impl IntoIterator<Item = &'a Value>) {
    for patch in patches {
        deep_merge(base, patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merges_nested_maps_and_replaces_scalars() {
        let mut base = yaml(
            "
machine:
  install:
    disk: /dev/sda
  network:
    hostname: node-1
",
        );
        let patch = yaml(
            "
machine:
  install:
    disk: /dev/nvme0n1
  network:
    interfaces:
      - interface: eth0
",
        );
        deep_merge(&mut base, &patch);

        let expected = yaml(
            "
machine:
  install:
    disk: /dev/nvme0n1
  network:
    hostname: node-1
    interfaces:
      - interface: eth0
",
        );
        assert_eq!(base, expected);
    }

    #[test]
    fn sequences_are_replaced_not_concatenated() {
        let mut base = yaml("list: [a, b]");
        let patch = yaml("list: [c]");
        deep_merge(&mut base, &patch);
        assert_eq!(base, yaml("list: [c]"));
    }
}
