//! The periodic timer that advances `planned -> rolling` once the
//! cool-down has elapsed (§4.4). Runs on its own fixed cadence,
//! independent of the event-driven [`crate::watcher`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use kube::ResourceExt;
use tracing::info;

use crate::annotations::{AnnotationPatch, RolloutState, State};
use crate::error::Result;
use crate::gateway::ClusterGateway;

pub const CADENCE: Duration = Duration::from_secs(10);

/// What the gate decided to do on this tick. Pure: given `now` and the
/// decoded annotation state, there's exactly one right answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayDecision {
    NoOp,
    Countdown { remaining_seconds: i64 },
    Advance,
}

pub fn evaluate(state: &RolloutState, now: i64, delay_seconds: u64) -> DelayDecision {
    if state.state != State::Planned {
        return DelayDecision::NoOp;
    }
    let Some(planned_at) = state.planned_at else {
        return DelayDecision::NoOp;
    };
    let waited = now - planned_at;
    let remaining = delay_seconds as i64 - waited;
    if remaining <= 0 {
        DelayDecision::Advance
    } else {
        DelayDecision::Countdown {
            remaining_seconds: remaining,
        }
    }
}

/// Drives [`evaluate`] against the real cluster every [`CADENCE`].
pub struct DelayGate {
    gateway: ClusterGateway,
    delay_seconds: u64,
    countdown_log_interval: Duration,
    last_logged_at: AtomicI64,
}

impl DelayGate {
    pub fn new(gateway: ClusterGateway, delay_seconds: u64, countdown_log_interval: Duration) -> Self {
        Self {
            gateway,
            delay_seconds,
            countdown_log_interval,
            last_logged_at: AtomicI64::new(0),
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(CADENCE);
        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "delay gate tick failed, will retry next cadence");
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let sts = self.gateway.read_statefulset().await?;
        let state = RolloutState::from_annotations(sts.annotations());
        let now = unix_now();
        match evaluate(&state, now, self.delay_seconds) {
            DelayDecision::NoOp => {}
            DelayDecision::Countdown { remaining_seconds } => {
                let last = self.last_logged_at.load(Ordering::Relaxed);
                let interval = self.countdown_log_interval.as_secs() as i64;
                if now - last >= interval {
                    info!(
                        namespace = self.gateway.namespace(),
                        name = self.gateway.name(),
                        remaining_seconds,
                        "rollout scheduled, counting down"
                    );
                    self.last_logged_at.store(now, Ordering::Relaxed);
                }
            }
            DelayDecision::Advance => {
                info!(
                    namespace = self.gateway.namespace(),
                    name = self.gateway.name(),
                    "cool-down elapsed, advancing to rolling"
                );
                let patch = AnnotationPatch::new().state(State::Rolling).build();
                self.gateway.patch_annotations(patch).await?;
            }
        }
        Ok(())
    }
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
