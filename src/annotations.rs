//! Encoding/decoding of the rollout state machine to/from StatefulSet
//! annotations (§3, §4.3).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::json;

pub const STATE_KEY: &str = "rollout-operator/state";
pub const REVISION_KEY: &str = "rollout-operator/last-revision";
pub const PLANNED_AT_KEY: &str = "rollout-operator/planned-at";

/// The rollout state machine's states. Only these four values are ever
/// written to the `state` annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    None,
    Planned,
    Rolling,
    Done,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::None => "none",
            State::Planned => "planned",
            State::Rolling => "rolling",
            State::Done => "done",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(State::None),
            "planned" => Ok(State::Planned),
            "rolling" => Ok(State::Rolling),
            "done" => Ok(State::Done),
            _ => Err(()),
        }
    }
}

/// Decoded rollout record. Missing keys decode to absent/default per §4.3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutState {
    pub state: State,
    pub last_revision: Option<String>,
    pub planned_at: Option<i64>,
}

impl RolloutState {
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        let state = annotations
            .get(STATE_KEY)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let last_revision = annotations.get(REVISION_KEY).cloned();
        // "planned-at decodes as integer seconds or 'absent' on parse failure"
        let planned_at = annotations.get(PLANNED_AT_KEY).and_then(|s| s.parse::<i64>().ok());
        RolloutState {
            state,
            last_revision,
            planned_at,
        }
    }
}

/// Builds the partial `{metadata: {annotations: {...}}}` merge patch,
/// containing only the fields explicitly set on the builder.
#[derive(Debug, Default)]
pub struct AnnotationPatch {
    state: Option<State>,
    last_revision: Option<String>,
    planned_at: Option<i64>,
}

impl AnnotationPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn last_revision(mut self, revision: impl Into<String>) -> Self {
        self.last_revision = Some(revision.into());
        self
    }

    pub fn planned_at(mut self, unix_seconds: i64) -> Self {
        self.planned_at = Some(unix_seconds);
        self
    }

    pub fn build(self) -> serde_json::Value {
        let mut annotations = serde_json::Map::new();
        if let Some(state) = self.state {
            annotations.insert(STATE_KEY.to_string(), json!(state.as_str()));
        }
        if let Some(revision) = self.last_revision {
            annotations.insert(REVISION_KEY.to_string(), json!(revision));
        }
        if let Some(planned_at) = self.planned_at {
            annotations.insert(PLANNED_AT_KEY.to_string(), json!(planned_at.to_string()));
        }
        json!({ "metadata": { "annotations": serde_json::Value::Object(annotations) } })
    }
}
