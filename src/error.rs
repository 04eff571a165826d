use thiserror::Error;

/// Errors surfaced by the rollout state machine.
///
/// Mirrors the policy table in the specification: most variants are
/// retryable by the orchestration runtime (see [`Error::is_retryable`]),
/// a few are deliberately terminal for a single reconciliation (wrong
/// strategy, missing pod-index labels) and are logged-and-skipped by the
/// caller instead of being returned as an error at all.
#[derive(Error, Debug)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("statefulset {0} has no .spec")]
    MissingSpec(String),

    #[error("timed out waiting for ordinals {0:?} to become ready")]
    ReadinessTimeout(Vec<u32>),

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the orchestration runtime should requeue and retry rather
    /// than drop the event on the floor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Kube(_) | Error::ReadinessTimeout(_))
    }
}
