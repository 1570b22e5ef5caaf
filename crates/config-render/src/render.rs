//! `ConfigPatch` selection/ordering and `ClusterMachineConfig` derivation
//! (spec §4.4).

use resource_store::Labels;
use snafu::ensure;

use crate::error::{Result, SizeExceededSnafu};
use crate::merge::deep_merge_all;
use crate::types::{ClusterMachineConfig, ConfigPatch};

/// The rendered-config size cap (spec §4.4: "Size cap: 4 MiB").
pub const MAX_RENDERED_CONFIG_BYTES: usize = 4 * 1024 * 1024;

/// Selects the `ConfigPatch` layers whose selector matches `machine_labels`
/// and orders them deepest-label-wins: ascending selector specificity
/// (fewer terms first, so a more specific later patch overrides an
/// overlapping key from an earlier, broader one), ties broken
/// lexicographically by `id` (spec §4.4: "patches are ordered
/// lexicographically by ID").
pub fn select_and_order<'a>(patches: &'a [ConfigPatch], machine_labels: &Labels) -> Vec<&'a ConfigPatch> {
    let mut matching: Vec<&ConfigPatch> =
        patches.iter().filter(|p| p.selector.matches(machine_labels)).collect();
    matching.sort_by(|a, b| a.specificity().cmp(&b.specificity()).then_with(|| a.id.cmp(&b.id)));
    matching
}

/// Derives a member's `ClusterMachineConfig` by layering every matching
/// patch onto `base` in selection order, then enforcing the size cap.
pub fn render(
    base: serde_yaml::Value,
    patches: &[ConfigPatch],
    machine_labels: &Labels,
) -> Result<ClusterMachineConfig> {
    let ordered = select_and_order(patches, machine_labels);
    let mut rendered = base;
    deep_merge_all(&mut rendered, ordered.iter().map(|p| &p.patch));

    let size = serde_yaml::to_string(&rendered)
        .map(|s| s.len())
        .unwrap_or(usize::MAX);
    ensure!(
        size <= MAX_RENDERED_CONFIG_BYTES,
        SizeExceededSnafu { size, max: MAX_RENDERED_CONFIG_BYTES }
    );

    Ok(ClusterMachineConfig { rendered })
}

#[cfg(test)]
mod tests {
    use resource_store::LabelQuery;

    use super::*;

    fn patch(id: &str, selector: LabelQuery, yaml: &str) -> ConfigPatch {
        ConfigPatch { id: id.to_owned(), selector, patch: serde_yaml::from_str(yaml).unwrap() }
    }

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn more_specific_patch_wins_on_overlap() {
        let patches = vec![
            patch("a-cluster-wide", LabelQuery::new().exists("cluster"), "machine:\n  network:\n    hostname: generic\n"),
            patch(
                "b-machine-specific",
                LabelQuery::new().exists("cluster").exists("machine"),
                "machine:\n  network:\n    hostname: node-1\n",
            ),
        ];
        let base = serde_yaml::from_str("machine: {}").unwrap();
        let rendered = render(base, &patches, &labels(&[("cluster", "c1"), ("machine", "m1")])).unwrap();

        let hostname = rendered.rendered["machine"]["network"]["hostname"].as_str().unwrap();
        assert_eq!(hostname, "node-1");
    }

    #[test]
    fn equal_specificity_breaks_tie_lexicographically_by_id() {
        let patches = vec![
            patch("z-last", LabelQuery::new().exists("cluster"), "machine:\n  network:\n    hostname: z\n"),
            patch("a-first", LabelQuery::new().exists("cluster"), "machine:\n  network:\n    hostname: a\n"),
        ];
        let base = serde_yaml::from_str("machine: {}").unwrap();
        let rendered = render(base, &patches, &labels(&[("cluster", "c1")])).unwrap();

        // "z-last" sorts after "a-first" lexicographically, so it applies
        // last and wins the overlapping key.
        assert_eq!(rendered.rendered["machine"]["network"]["hostname"].as_str().unwrap(), "z");
    }

    #[test]
    fn non_matching_patches_are_excluded() {
        let patches = vec![patch("only-worker", LabelQuery::new().equals("role", "worker"), "extra: true")];
        let base = serde_yaml::from_str("machine: {}").unwrap();
        let rendered = render(base, &patches, &labels(&[("role", "control-plane")])).unwrap();
        assert!(rendered.rendered.get("extra").is_none());
    }

    #[test]
    fn oversized_merge_is_rejected() {
        let huge = "x".repeat(MAX_RENDERED_CONFIG_BYTES + 1);
        let patches = vec![patch("p", LabelQuery::new(), &format!("blob: \"{huge}\""))];
        let base = serde_yaml::from_str("machine: {}").unwrap();
        let err = render(base, &patches, &Labels::new()).unwrap_err();
        assert!(matches!(err, crate::error::Error::SizeExceeded { .. }));
    }
}
