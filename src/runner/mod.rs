//! The job runner port and its in-process implementation.
//!
//! The trigger engine never owns builds. It reads snapshots of the runner's
//! queue and executors, asks for single-item mutations, and schedules new
//! builds. Everything behind that interface belongs to the runner:
//!
//! - [`JobRunner`]: the port the engine consumes
//! - [`LocalRunner`]: runs a shell command per build with bounded executors
//! - [`ParameterSet`]: build parameters and their environment export

use std::future::Future;

use tokio::sync::oneshot;

use crate::types::{BuildId, Outcome, PullRequestEvent};

pub mod local;
pub mod parameters;

pub use local::{LocalRunner, LocalRunnerConfig, RunnerError};
pub use parameters::ParameterSet;

/// Why a build was started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cause {
    /// Started for a pull request event.
    PullRequest(PullRequestEvent),

    /// Started by anything else (a user, a timer, ...).
    Other(String),
}

impl Cause {
    /// The pull request event behind this cause, if any.
    pub fn pull_request(&self) -> Option<&PullRequestEvent> {
        match self {
            Cause::PullRequest(event) => Some(event),
            Cause::Other(_) => None,
        }
    }
}

/// Whether a work item is waiting for an executor or occupying one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    Queued,
    Running,
}

/// Snapshot of one queued or running build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: BuildId,
    pub causes: Vec<Cause>,
    pub status: WorkStatus,
    pub description: Option<String>,
}

/// A freshly scheduled build.
///
/// `completion` resolves exactly once with the build's terminal outcome. If
/// the runner drops the sender instead, the build is lost.
#[derive(Debug)]
pub struct BuildHandle {
    pub id: BuildId,
    pub url: String,
    pub completion: oneshot::Receiver<Outcome>,
}

/// The operations the trigger engine needs from a job runner.
///
/// Listing never fails; an unreachable runner has nothing to list. Mutations
/// may fail (typically because the item finished after it was listed), and
/// the engine tolerates that.
pub trait JobRunner {
    /// The error type returned by mutations.
    type Error: std::fmt::Display + Send;

    /// Link to the job itself.
    fn job_url(&self) -> String;

    /// Parameter defaults declared by the job.
    fn default_parameters(&self) -> ParameterSet;

    /// Builds waiting for an executor.
    fn list_queued(&self) -> impl Future<Output = Vec<WorkItem>> + Send;

    /// Builds occupying an executor.
    fn list_running(&self) -> impl Future<Output = Vec<WorkItem>> + Send;

    /// Removes a queued build from the queue.
    fn cancel(&self, item: &WorkItem) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Replaces the human-readable description of a build.
    fn set_description(
        &self,
        item: &WorkItem,
        description: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Stops a running build, which then completes with `outcome`.
    fn interrupt(
        &self,
        item: &WorkItem,
        outcome: Outcome,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Queues a new build for `event`.
    fn schedule(
        &self,
        event: &PullRequestEvent,
        parameters: ParameterSet,
    ) -> impl Future<Output = Result<BuildHandle, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_event;

    #[test]
    fn only_pull_request_causes_carry_an_event() {
        let event = sample_event("42", "org/src");
        assert_eq!(Cause::PullRequest(event.clone()).pull_request(), Some(&event));
        assert_eq!(Cause::Other("timer".to_string()).pull_request(), None);
    }
}
