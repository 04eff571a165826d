//! Reacts to StatefulSet change events: filters by identity and
//! strategy, transitions the rollout state machine, and hands off to
//! the [`crate::executor::RolloutExecutor`] once rolling (§4.5).

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::apps::v1::StatefulSet;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use crate::annotations::{AnnotationPatch, RolloutState, State};
use crate::config::Config;
use crate::delay::unix_now;
use crate::error::{Error, Result};
use crate::executor::{ExecutorOutcome, RolloutExecutor};
use crate::gateway::ClusterGateway;
use crate::selector;

/// The decision the watcher reaches for a single reconciliation,
/// computed from inputs alone (§4.5's dispatch table) — no I/O here so
/// the table can be unit-tested directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchAction {
    Ignore,
    RevisionComplete,
    SchedulePlanned { last_revision: String, planned_at: i64 },
    RepairPlannedAt { planned_at: i64 },
    WaitForDelay,
    Execute,
}

/// §4.5 step 5's dispatch table. `strategy_is_ondelete` folds in the
/// open question from §9: a non-OnDelete strategy observed while a
/// rollout is already `rolling` still lets that rollout finish.
pub fn dispatch(
    strategy_is_ondelete: bool,
    update_revision: Option<&str>,
    outstanding: bool,
    state: &RolloutState,
    now: i64,
) -> WatchAction {
    if !strategy_is_ondelete {
        return if state.state == State::Rolling {
            WatchAction::Execute
        } else {
            WatchAction::Ignore
        };
    }
    let Some(update_revision) = update_revision else {
        return WatchAction::Ignore;
    };
    match state.state {
        State::None | State::Done => {
            if outstanding {
                WatchAction::SchedulePlanned {
                    last_revision: update_revision.to_string(),
                    planned_at: now,
                }
            } else if state.last_revision.as_deref() == Some(update_revision) {
                WatchAction::RevisionComplete
            } else {
                WatchAction::Ignore
            }
        }
        State::Planned => {
            if state.planned_at.is_none() {
                WatchAction::RepairPlannedAt { planned_at: now }
            } else {
                WatchAction::WaitForDelay
            }
        }
        State::Rolling => WatchAction::Execute,
    }
}

pub struct ReconcileContext {
    pub gateway: ClusterGateway,
    pub config: Config,
}

/// Entry point wired into `kube::runtime::Controller::run`.
pub async fn reconcile(sts: Arc<StatefulSet>, ctx: Arc<ReconcileContext>) -> Result<Action> {
    let name = sts.name_any();
    let namespace = sts.namespace().unwrap_or_default();
    debug!(namespace, name, "reconciling");

    let spec = sts.spec.as_ref().ok_or_else(|| Error::MissingSpec(name.clone()))?;
    let strategy_is_ondelete = spec
        .update_strategy
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        == Some("OnDelete");

    let state = RolloutState::from_annotations(sts.annotations());

    if !strategy_is_ondelete && state.state != State::Rolling {
        debug!(namespace, name, "not an OnDelete statefulset, skipping");
        return Ok(Action::await_change());
    }

    let update_revision = sts.status.as_ref().and_then(|s| s.update_revision.clone());
    if update_revision.is_none() {
        debug!(namespace, name, "no updateRevision in status yet, skipping");
        return Ok(Action::await_change());
    }

    let selector = selector::equality_selector(&sts)?;
    let pods = ctx.gateway.list_pods(&selector).await?;
    if pods.items.is_empty() {
        return Ok(Action::await_change());
    }
    if pods.items.iter().any(|p| !selector::has_pod_index_label(p)) {
        error!(namespace, name, "one or more pods are missing the pod-index label, refusing to act");
        return Ok(Action::await_change());
    }

    let status = sts.status.as_ref().ok_or_else(|| Error::Invariant("statefulset has no status".into()))?;
    let outstanding = status.replicas > status.updated_replicas.unwrap_or(0);

    let action = dispatch(strategy_is_ondelete, update_revision.as_deref(), outstanding, &state, unix_now());
    match action {
        WatchAction::Ignore => Ok(Action::await_change()),
        WatchAction::RevisionComplete => {
            info!(namespace, name, revision = ?update_revision, "revision complete");
            Ok(Action::await_change())
        }
        WatchAction::SchedulePlanned { last_revision, planned_at } => {
            let patch = AnnotationPatch::new()
                .state(State::Planned)
                .last_revision(last_revision.clone())
                .planned_at(planned_at)
                .build();
            ctx.gateway.patch_annotations(patch).await?;
            ctx.gateway
                .record_event(&sts, "RolloutDetected", format!("new revision {last_revision} detected"), EventType::Normal)
                .await
                .ok();
            ctx.gateway
                .record_event(
                    &sts,
                    "RolloutScheduled",
                    format!("rollout scheduled, cool-down {}s", ctx.config.delay_seconds),
                    EventType::Normal,
                )
                .await
                .ok();
            Ok(Action::await_change())
        }
        WatchAction::RepairPlannedAt { planned_at } => {
            let patch = AnnotationPatch::new().planned_at(planned_at).build();
            ctx.gateway.patch_annotations(patch).await?;
            Ok(Action::await_change())
        }
        WatchAction::WaitForDelay => Ok(Action::await_change()),
        WatchAction::Execute => {
            // R0 is the target revision captured at the moment `rolling`
            // was entered, persisted as `last-revision`.
            let target_revision = state
                .last_revision
                .clone()
                .or(update_revision.clone())
                .ok_or_else(|| Error::Invariant("rolling with no target revision recorded".into()))?;
            let executor = RolloutExecutor::new(&ctx.gateway, &ctx.config);
            match executor.run(&sts, &target_revision).await? {
                ExecutorOutcome::Finalized => Ok(Action::await_change()),
                ExecutorOutcome::Superseded { .. } => Ok(Action::requeue(Duration::from_secs(1))),
            }
        }
    }
}

pub fn error_policy(sts: Arc<StatefulSet>, err: &Error, _ctx: Arc<ReconcileContext>) -> Action {
    let name = sts.name_any();
    if err.is_retryable() {
        warn!(name, error = %err, "reconciliation failed, will retry");
        Action::requeue(Duration::from_secs(15))
    } else {
        error!(name, error = %err, "reconciliation failed, not retrying this tick");
        Action::await_change()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(planned_at: Option<i64>) -> RolloutState {
        RolloutState {
            state: State::Planned,
            last_revision: Some("rev-1".into()),
            planned_at,
        }
    }

    #[test]
    fn none_with_outstanding_schedules() {
        let state = RolloutState::default();
        let action = dispatch(true, Some("rev-2"), true, &state, 1000);
        assert_eq!(
            action,
            WatchAction::SchedulePlanned {
                last_revision: "rev-2".into(),
                planned_at: 1000
            }
        );
    }

    #[test]
    fn done_with_matching_revision_and_no_outstanding_is_complete() {
        let state = RolloutState {
            state: State::Done,
            last_revision: Some("rev-2".into()),
            planned_at: None,
        };
        assert_eq!(dispatch(true, Some("rev-2"), false, &state, 1000), WatchAction::RevisionComplete);
    }

    #[test]
    fn planned_without_planned_at_is_repaired() {
        let state = planned(None);
        assert_eq!(dispatch(true, Some("rev-1"), true, &state, 1000), WatchAction::RepairPlannedAt { planned_at: 1000 });
    }

    #[test]
    fn planned_with_planned_at_waits_for_delay_gate() {
        let state = planned(Some(500));
        assert_eq!(dispatch(true, Some("rev-1"), true, &state, 1000), WatchAction::WaitForDelay);
    }

    #[test]
    fn rolling_always_executes() {
        let state = RolloutState {
            state: State::Rolling,
            last_revision: Some("rev-1".into()),
            planned_at: None,
        };
        assert_eq!(dispatch(true, Some("rev-1"), true, &state, 1000), WatchAction::Execute);
    }

    #[test]
    fn wrong_strategy_ignored_when_not_rolling() {
        let state = RolloutState::default();
        assert_eq!(dispatch(false, Some("rev-1"), true, &state, 1000), WatchAction::Ignore);
    }

    #[test]
    fn wrong_strategy_still_finishes_in_flight_rollout() {
        let state = RolloutState {
            state: State::Rolling,
            last_revision: Some("rev-1".into()),
            planned_at: None,
        };
        assert_eq!(dispatch(false, Some("rev-1"), true, &state, 1000), WatchAction::Execute);
    }

    #[test]
    fn missing_update_revision_is_ignored() {
        let state = RolloutState::default();
        assert_eq!(dispatch(true, None, true, &state, 1000), WatchAction::Ignore);
    }
}
