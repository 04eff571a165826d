use std::time::Duration;

use clap::Parser;

use crate::error::{Error, Result};

/// Runtime configuration for the operator, one flag/env var per §6.
///
/// All variables are read under a single fixed prefix so that the
/// process can be configured purely from its pod spec without a
/// mounted config file, matching the teacher's `clap`-derived CLI.
#[derive(Parser, Debug, Clone)]
#[command(name = "rollout-operator", version, about = "controlled OnDelete StatefulSet rollouts")]
pub struct Config {
    /// Namespace of the managed StatefulSet.
    #[arg(long, env = "ROLLOUT_OPERATOR_TARGET_NAMESPACE")]
    pub target_namespace: String,

    /// Name of the managed StatefulSet.
    #[arg(long, env = "ROLLOUT_OPERATOR_TARGET_STATEFUL_SET")]
    pub target_stateful_set: String,

    /// Cool-down between detection and the first delete.
    #[arg(long, env = "ROLLOUT_OPERATOR_DELAY_SECONDS", default_value_t = 600)]
    pub delay_seconds: u64,

    /// Bias disruption towards the upper ordinal half first.
    #[arg(long, env = "ROLLOUT_OPERATOR_ENABLE_HALF_SPLIT", default_value_t = true)]
    pub enable_half_split: bool,

    /// Batch size: how many pods may be deleting-and-not-ready at once.
    #[arg(long, env = "ROLLOUT_OPERATOR_MAX_UNAVAILABLE", default_value_t = 2)]
    pub max_unavailable: u32,

    /// Countdown log cadence in seconds while `planned`.
    #[arg(long, env = "ROLLOUT_OPERATOR_COUNTDOWN_LOG_INTERVAL", default_value_t = 60)]
    pub countdown_log_interval: u64,

    /// Grace period seconds passed to pod deletes.
    #[arg(long, env = "ROLLOUT_OPERATOR_POD_TERMINATION_GRACE_PERIOD", default_value_t = 30)]
    pub pod_termination_grace_period: u32,

    /// Structured JSON logs instead of the human-readable formatter.
    #[arg(long, env = "ROLLOUT_OPERATOR_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl Config {
    /// Validate required fields; empty or whitespace-only values fail startup.
    pub fn validate(self) -> Result<Self> {
        if self.target_namespace.trim().is_empty() {
            return Err(Error::Config("TARGET_NAMESPACE must not be empty".into()));
        }
        if self.target_stateful_set.trim().is_empty() {
            return Err(Error::Config("TARGET_STATEFUL_SET must not be empty".into()));
        }
        if self.max_unavailable == 0 {
            return Err(Error::Config("MAX_UNAVAILABLE must be >= 1".into()));
        }
        if self.countdown_log_interval == 0 {
            return Err(Error::Config("COUNTDOWN_LOG_INTERVAL must be >= 1".into()));
        }
        Ok(self)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }

    pub fn countdown_interval(&self) -> Duration {
        Duration::from_secs(self.countdown_log_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            target_namespace: "demo".into(),
            target_stateful_set: "demo-sts".into(),
            delay_seconds: 600,
            enable_half_split: true,
            max_unavailable: 2,
            countdown_log_interval: 60,
            pod_termination_grace_period: 30,
            json_logs: false,
        }
    }

    #[test]
    fn rejects_blank_namespace() {
        let mut c = base();
        c.target_namespace = "   ".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_blank_stateful_set() {
        let mut c = base();
        c.target_stateful_set = "".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn accepts_defaults() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn rejects_zero_max_unavailable() {
        let mut c = base();
        c.max_unavailable = 0;
        assert!(c.validate().is_err());
    }
}
