//! Build states reported to the hosting service and build outcomes reported
//! by the job runner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a commit build status.
///
/// Per build the progression is monotonic: `InProgress` first, then exactly
/// one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildState {
    InProgress,
    Successful,
    Failed,
    Stopped,
}

impl BuildState {
    /// The wire token the status API expects.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildState::InProgress => "INPROGRESS",
            BuildState::Successful => "SUCCESSFUL",
            BuildState::Failed => "FAILED",
            BuildState::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal result of a build as seen by the job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Unstable,
    Failure,
    NotBuilt,
    /// Aborted by a user or by the system (e.g. superseded by a newer event).
    Aborted,
}

impl From<Outcome> for BuildState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => BuildState::Successful,
            Outcome::Aborted => BuildState::Stopped,
            Outcome::Unstable | Outcome::Failure | Outcome::NotBuilt => BuildState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tokens_match_serde_representation() {
        for state in [
            BuildState::InProgress,
            BuildState::Successful,
            BuildState::Failed,
            BuildState::Stopped,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
        }
    }

    #[test]
    fn outcome_mapping() {
        assert_eq!(BuildState::from(Outcome::Success), BuildState::Successful);
        assert_eq!(BuildState::from(Outcome::Aborted), BuildState::Stopped);
        assert_eq!(BuildState::from(Outcome::Failure), BuildState::Failed);
        assert_eq!(BuildState::from(Outcome::Unstable), BuildState::Failed);
        assert_eq!(BuildState::from(Outcome::NotBuilt), BuildState::Failed);
    }
}
