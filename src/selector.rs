//! Pod-to-ordinal resolution, revision comparison, readiness evaluation,
//! halving and batching (§4.2). All functions here are pure: no I/O, no
//! `kube::Client`, so they run the same way in a unit test as in the
//! cluster.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::core::Selector;
use kube::ResourceExt;

use crate::error::{Error, Result};

pub const POD_INDEX_LABEL: &str = "apps.kubernetes.io/pod-index";
pub const REVISION_LABEL: &str = "controller-revision-hash";

/// Resolve a pod's StatefulSet ordinal per §3: the pod-index label takes
/// priority; if present but not an integer, there is no fallback to the
/// name suffix and the pod has no ordinal.
pub fn ordinal(pod: &Pod, sts_name: &str) -> Option<u32> {
    if let Some(label) = pod.labels().get(POD_INDEX_LABEL) {
        return label.parse().ok();
    }
    let name = pod.metadata.name.as_deref()?;
    let suffix = name.strip_prefix(&format!("{sts_name}-"))?;
    suffix.parse().ok()
}

/// Whether the pod-index label is present at all, irrespective of
/// whether it parses. The watcher refuses to act when this is false for
/// any pod (§4.5 step 3).
pub fn has_pod_index_label(pod: &Pod) -> bool {
    pod.labels().contains_key(POD_INDEX_LABEL)
}

/// A pod needs updating iff its revision label doesn't match the target,
/// including the case where the label is entirely missing.
pub fn needs_update(pod: &Pod, target_revision: &str) -> bool {
    pod.labels()
        .get(REVISION_LABEL)
        .map(|v| v != target_revision)
        .unwrap_or(true)
}

/// A pod with a non-empty deletion timestamp is the old instance,
/// terminating — never the replacement.
pub fn is_terminating(pod: &Pod) -> bool {
    pod.metadata.deletion_timestamp.is_some()
}

pub fn is_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
        .unwrap_or(false)
}

/// `lower` = ordinals strictly less than `replicas/2` (integer division);
/// `upper` = the rest. Both halves come back ascending-sorted.
pub fn split_halves(ordinals: &[u32], replicas: u32) -> (Vec<u32>, Vec<u32>) {
    let mid = replicas / 2;
    let mut lower: Vec<u32> = ordinals.iter().copied().filter(|&o| o < mid).collect();
    let mut upper: Vec<u32> = ordinals.iter().copied().filter(|&o| o >= mid).collect();
    lower.sort_unstable();
    upper.sort_unstable();
    (lower, upper)
}

/// Sorts ascending and partitions into contiguous chunks of at most `size`.
pub fn batch(ordinals: &[u32], size: u32) -> Vec<Vec<u32>> {
    let mut sorted = ordinals.to_vec();
    sorted.sort_unstable();
    let size = size.max(1) as usize;
    sorted.chunks(size).map(|chunk| chunk.to_vec()).collect()
}

/// Joins the StatefulSet's label selector match-labels into a single
/// equality selector, the same conversion the teacher used for
/// Deployment selectors.
pub fn equality_selector(sts: &StatefulSet) -> Result<Selector> {
    let spec = sts
        .spec
        .as_ref()
        .ok_or_else(|| Error::MissingSpec(sts.name_any()))?;
    spec.selector
        .clone()
        .try_into()
        .map_err(|e| Error::Invariant(format!("malformed label selector: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PodCondition, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use std::collections::BTreeMap;

    fn pod_with(name: &str, labels: &[(&str, &str)]) -> Pod {
        let mut map = BTreeMap::new();
        for (k, v) in labels {
            map.insert(k.to_string(), v.to_string());
        }
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(map),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn ordinal_from_label() {
        let pod = pod_with("web-5", &[(POD_INDEX_LABEL, "13")]);
        assert_eq!(ordinal(&pod, "web"), Some(13));
    }

    #[test]
    fn ordinal_falls_back_to_name_when_label_missing() {
        let pod = pod_with("web-5", &[]);
        assert_eq!(ordinal(&pod, "web"), Some(5));
    }

    #[test]
    fn ordinal_invalid_label_does_not_fall_back() {
        let pod = pod_with("web-5", &[(POD_INDEX_LABEL, "invalid")]);
        assert_eq!(ordinal(&pod, "web"), None);
    }

    #[test]
    fn ordinal_invalid_name_suffix() {
        let pod = pod_with("web-invalid", &[]);
        assert_eq!(ordinal(&pod, "web"), None);
    }

    #[test]
    fn ordinal_wrong_prefix() {
        let pod = pod_with("other-5", &[]);
        assert_eq!(ordinal(&pod, "web"), None);
    }

    #[test]
    fn ordinal_no_metadata() {
        let pod = Pod::default();
        assert_eq!(ordinal(&pod, "web"), None);
    }

    #[test]
    fn needs_update_matching_revision() {
        let pod = pod_with("web-0", &[(REVISION_LABEL, "rev-123")]);
        assert!(!needs_update(&pod, "rev-123"));
    }

    #[test]
    fn needs_update_different_revision() {
        let pod = pod_with("web-0", &[(REVISION_LABEL, "rev-123")]);
        assert!(needs_update(&pod, "rev-456"));
    }

    #[test]
    fn needs_update_missing_label() {
        let pod = pod_with("web-0", &[]);
        assert!(needs_update(&pod, "rev-123"));
    }

    #[test]
    fn split_halves_even() {
        let ordinals: Vec<u32> = (0..10).collect();
        let (lower, upper) = split_halves(&ordinals, 10);
        assert_eq!(lower, vec![0, 1, 2, 3, 4]);
        assert_eq!(upper, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn split_halves_odd() {
        let ordinals: Vec<u32> = (0..9).collect();
        let (lower, upper) = split_halves(&ordinals, 9);
        assert_eq!(lower, vec![0, 1, 2, 3]);
        assert_eq!(upper, vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn split_halves_single_replica() {
        let (lower, upper) = split_halves(&[0], 1);
        assert_eq!(lower, Vec::<u32>::new());
        assert_eq!(upper, vec![0]);
    }

    #[test]
    fn split_halves_two_replicas() {
        let (lower, upper) = split_halves(&[0, 1], 2);
        assert_eq!(lower, vec![0]);
        assert_eq!(upper, vec![1]);
    }

    #[test]
    fn split_halves_zero_replicas() {
        let (lower, upper) = split_halves(&[], 0);
        assert!(lower.is_empty() && upper.is_empty());
    }

    #[test]
    fn split_halves_non_contiguous() {
        let (lower, upper) = split_halves(&[0, 2, 5, 7, 9], 10);
        assert_eq!(lower, vec![0, 2]);
        assert_eq!(upper, vec![5, 7, 9]);
    }

    #[test]
    fn batch_size_one() {
        assert_eq!(batch(&[0, 1, 2, 3, 4], 1), vec![vec![0], vec![1], vec![2], vec![3], vec![4]]);
    }

    #[test]
    fn batch_size_two() {
        assert_eq!(batch(&[0, 1, 2, 3, 4], 2), vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn batch_empty() {
        assert_eq!(batch(&[], 2), Vec::<Vec<u32>>::new());
    }

    #[test]
    fn batch_sorts_first() {
        assert_eq!(batch(&[5, 1, 3, 2, 4, 0], 2), vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    fn ready_pod(name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..Default::default()
            },
            status: Some(PodStatus {
                conditions: Some(vec![PodCondition {
                    type_: "Ready".into(),
                    status: "True".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn ready_pod_is_ready() {
        assert!(is_ready(&ready_pod("web-0")));
    }

    #[test]
    fn pod_without_conditions_is_not_ready() {
        assert!(!is_ready(&Pod::default()));
    }

    #[test]
    fn terminating_pod_has_deletion_timestamp() {
        let mut pod = ready_pod("web-0");
        pod.metadata.deletion_timestamp = Some(Time(chrono::DateTime::<chrono::Utc>::MIN_UTC));
        assert!(is_terminating(&pod));
        assert!(!is_terminating(&ready_pod("web-1")));
    }
}
