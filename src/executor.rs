//! Executes the batched delete-and-wait loop, detects mid-flight target
//! changes, and finalizes the rollout (§4.6).

use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{info, warn};

use crate::annotations::{AnnotationPatch, State};
use crate::config::Config;
use crate::error::Result;
use crate::gateway::ClusterGateway;
use crate::readiness::ReadinessWaiter;
use crate::selector;

pub const READINESS_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorOutcome {
    /// Nothing needed updating, or every batch finished: `state=done`.
    Finalized,
    /// A newer `updateRevision` was observed mid-flight; the executor
    /// bailed out cleanly and `last-revision` now points at it.
    Superseded { new_revision: String },
}

/// Builds the ordered list of batches for a rollout over `ordinals`
/// (§4.6 "Plan"): halves-first (upper before lower) when enabled and
/// `replicas > 1`, otherwise one range containing every ordinal. Within
/// each range, batches are at most `max_unavailable` wide, ascending.
pub fn build_plan(ordinals: &[u32], replicas: u32, halves_enabled: bool, max_unavailable: u32) -> Vec<Vec<u32>> {
    let ranges: Vec<Vec<u32>> = if halves_enabled && replicas > 1 {
        let (lower, upper) = selector::split_halves(ordinals, replicas);
        vec![upper, lower]
    } else {
        let mut all = ordinals.to_vec();
        all.sort_unstable();
        vec![all]
    };
    ranges
        .into_iter()
        .flat_map(|range| selector::batch(&range, max_unavailable))
        .collect()
}

pub struct RolloutExecutor<'a> {
    gateway: &'a ClusterGateway,
    config: &'a Config,
}

impl<'a> RolloutExecutor<'a> {
    pub fn new(gateway: &'a ClusterGateway, config: &'a Config) -> Self {
        Self { gateway, config }
    }

    /// Runs one rollout invocation against `target_revision` (this is
    /// `R0` from §4.6: the `updateRevision` observed at the moment
    /// `rolling` was entered, captured by the caller).
    pub async fn run(&self, sts: &StatefulSet, target_revision: &str) -> Result<ExecutorOutcome> {
        let replicas = replica_count(sts);
        let selector = selector::equality_selector(sts)?;

        let pods = self.gateway.list_pods(&selector).await?;
        let all_ordinals = resolved_ordinals(&pods.items, &sts.name_any());
        let needs_update = pods
            .items
            .iter()
            .filter(|p| selector::needs_update(p, target_revision))
            .count();

        if needs_update == 0 {
            return self.finalize(sts, target_revision).await;
        }

        let plan = build_plan(&all_ordinals, replicas, self.config.enable_half_split, self.config.max_unavailable);
        let waiter = ReadinessWaiter::new(self.gateway, READINESS_POLL_INTERVAL, READINESS_TIMEOUT);

        self.gateway
            .record_event(
                sts,
                "RolloutStarted",
                format!("rolling out {target_revision} to {needs_update} pod(s) in {} batch(es)", plan.len()),
                EventType::Normal,
            )
            .await
            .ok();

        for batch in plan {
            if batch.is_empty() {
                continue;
            }

            // Supersession check: re-read before touching this batch.
            let current = self.gateway.read_statefulset().await?;
            let current_revision = current.status.as_ref().and_then(|s| s.update_revision.clone());
            if current_revision.as_deref() != Some(target_revision) {
                let new_revision = current_revision.unwrap_or_default();
                info!(
                    sts = sts.name_any(),
                    old_revision = target_revision,
                    new_revision,
                    "superseded mid-rollout, yielding to a fresh plan"
                );
                let patch = AnnotationPatch::new().last_revision(new_revision.clone()).build();
                self.gateway.patch_annotations(patch).await?;
                self.gateway
                    .record_event(
                        sts,
                        "RolloutInterrupted",
                        format!("superseded by revision {new_revision}"),
                        EventType::Normal,
                    )
                    .await
                    .ok();
                return Ok(ExecutorOutcome::Superseded { new_revision });
            }

            let batch_pods = self.gateway.list_pods(&selector).await?;
            let sts_name = sts.name_any();
            let targeted: Vec<_> = batch_pods
                .items
                .iter()
                .filter(|p| {
                    selector::ordinal(p, &sts_name).map(|o| batch.contains(&o)).unwrap_or(false)
                        && selector::needs_update(p, target_revision)
                })
                .collect();

            for pod in &targeted {
                self.gateway
                    .delete_pod(&pod.name_any(), self.config.pod_termination_grace_period)
                    .await?;
            }

            waiter.wait(&sts_name, &selector, &batch).await?;
        }

        self.finalize(sts, target_revision).await
    }

    async fn finalize(&self, sts: &StatefulSet, target_revision: &str) -> Result<ExecutorOutcome> {
        let selector = selector::equality_selector(sts)?;
        let pods = self.gateway.list_pods(&selector).await?;
        let sts_name = sts.name_any();
        let still_outdated: Vec<_> = pods
            .items
            .iter()
            .filter(|p| selector::needs_update(p, target_revision))
            .map(|p| p.name_any())
            .collect();

        if !still_outdated.is_empty() {
            warn!(sts = sts_name, pods = ?still_outdated, "finalizing with pods still outdated");
            self.gateway
                .record_event(
                    sts,
                    "RolloutFinalizedWithDrift",
                    format!("{} pod(s) still outdated at finalize time", still_outdated.len()),
                    EventType::Warning,
                )
                .await
                .ok();
        }

        let patch = AnnotationPatch::new()
            .state(State::Done)
            .last_revision(target_revision)
            .build();
        self.gateway.patch_annotations(patch).await?;
        self.gateway
            .record_event(sts, "RolloutCompleted", format!("rolled out to {target_revision}"), EventType::Normal)
            .await
            .ok();
        Ok(ExecutorOutcome::Finalized)
    }
}

fn replica_count(sts: &StatefulSet) -> u32 {
    let spec_replicas = sts.spec.as_ref().and_then(|s| s.replicas);
    let status_replicas = sts.status.as_ref().map(|s| s.replicas).unwrap_or(0);
    spec_replicas.unwrap_or(status_replicas).max(0) as u32
}

fn resolved_ordinals(pods: &[k8s_openapi::api::core::v1::Pod], sts_name: &str) -> Vec<u32> {
    pods.iter().filter_map(|p| selector::ordinal(p, sts_name)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn halves_enabled_orders_upper_before_lower() {
        let ordinals: Vec<u32> = (0..32).collect();
        let plan = build_plan(&ordinals, 32, true, 2);
        // first batch should be drawn from the upper half [16, 32)
        assert!(plan[0].iter().all(|o| *o >= 16));
        // last batch should be drawn from the lower half [0, 16)
        assert!(plan.last().unwrap().iter().all(|o| *o < 16));
    }

    #[test]
    fn halves_disabled_uses_single_ascending_range() {
        let ordinals: Vec<u32> = (0..6).collect();
        let plan = build_plan(&ordinals, 6, false, 2);
        assert_eq!(plan, vec![vec![0, 1], vec![2, 3], vec![4, 5]]);
    }

    #[test]
    fn single_replica_never_splits() {
        let plan = build_plan(&[0], 1, true, 2);
        assert_eq!(plan, vec![vec![0]]);
    }

    #[test]
    fn batches_never_exceed_max_unavailable() {
        let ordinals: Vec<u32> = (0..10).collect();
        let plan = build_plan(&ordinals, 10, true, 3);
        assert!(plan.iter().all(|b| b.len() <= 3));
    }

    #[test]
    fn plan_covers_every_ordinal_exactly_once() {
        let ordinals: Vec<u32> = (0..17).collect();
        let plan = build_plan(&ordinals, 17, true, 4);
        let mut covered: Vec<u32> = plan.into_iter().flatten().collect();
        covered.sort_unstable();
        assert_eq!(covered, ordinals);
    }
}
