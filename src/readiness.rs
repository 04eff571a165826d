//! Waits for a set of ordinals to converge to new-pod+Ready (§4.7).

use std::time::{Duration, Instant};

use k8s_openapi::api::core::v1::Pod;
use kube::core::Selector;
use kube::ResourceExt;
use tracing::info;

use crate::error::{Error, Result};
use crate::gateway::ClusterGateway;
use crate::selector;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);
const MAX_SAMPLED_NAMES: usize = 5;

/// Pure evaluation of a poll against a pod listing: no I/O, no clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessStatus {
    Ready,
    Pending {
        ready_count: usize,
        missing_ordinals: Vec<u32>,
        not_ready_names: Vec<String>,
    },
}

pub fn evaluate(pods: &[Pod], sts_name: &str, ordinals: &[u32]) -> ReadinessStatus {
    let mut ready_count = 0;
    let mut missing_ordinals = Vec::new();
    let mut not_ready_names = Vec::new();

    for &want in ordinals {
        let candidate = pods
            .iter()
            .find(|p| selector::ordinal(p, sts_name) == Some(want) && !selector::is_terminating(p));
        match candidate {
            None => missing_ordinals.push(want),
            Some(pod) => {
                if selector::is_ready(pod) {
                    ready_count += 1;
                } else {
                    not_ready_names.push(pod.name_any());
                }
            }
        }
    }

    if missing_ordinals.is_empty() && not_ready_names.is_empty() {
        ReadinessStatus::Ready
    } else {
        ReadinessStatus::Pending {
            ready_count,
            missing_ordinals,
            not_ready_names,
        }
    }
}

pub struct ReadinessWaiter<'a> {
    gateway: &'a ClusterGateway,
    poll_interval: Duration,
    timeout: Duration,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(gateway: &'a ClusterGateway, poll_interval: Duration, timeout: Duration) -> Self {
        Self {
            gateway,
            poll_interval,
            timeout,
        }
    }

    pub async fn wait(&self, sts_name: &str, selector: &Selector, ordinals: &[u32]) -> Result<()> {
        if ordinals.is_empty() {
            return Ok(());
        }
        let deadline = Instant::now() + self.timeout;
        let mut last_logged = Instant::now() - PROGRESS_LOG_INTERVAL;
        loop {
            let pods = self.gateway.list_pods(selector).await?;
            match evaluate(&pods.items, sts_name, ordinals) {
                ReadinessStatus::Ready => return Ok(()),
                ReadinessStatus::Pending {
                    ready_count,
                    missing_ordinals,
                    not_ready_names,
                } => {
                    if last_logged.elapsed() >= PROGRESS_LOG_INTERVAL {
                        let sampled: Vec<_> = not_ready_names.iter().take(MAX_SAMPLED_NAMES).collect();
                        info!(
                            sts_name,
                            ready_count,
                            total = ordinals.len(),
                            missing_ordinals = ?missing_ordinals,
                            sampled_not_ready = ?sampled,
                            "waiting for batch readiness"
                        );
                        last_logged = Instant::now();
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::ReadinessTimeout(ordinals.to_vec()));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
