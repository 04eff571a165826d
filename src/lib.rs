//! Controlled, delay-gated, batched rollouts of a single `OnDelete`
//! StatefulSet. See the component modules for the pieces: [`gateway`]
//! talks to the API server, [`selector`] and [`annotations`] hold the
//! pure decision logic, [`delay`] and [`executor`] drive the two
//! concurrent loops, and [`watcher`] ties them together behind
//! `kube::runtime::Controller`.

pub mod annotations;
pub mod config;
pub mod delay;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod readiness;
pub mod selector;
pub mod watcher;

pub use annotations::{AnnotationPatch, RolloutState, State};
pub use config::Config;
pub use delay::DelayGate;
pub use error::{Error, Result};
pub use executor::{ExecutorOutcome, RolloutExecutor};
pub use gateway::ClusterGateway;
pub use readiness::ReadinessWaiter;
pub use watcher::{ReconcileContext, WatchAction};
