//! Per-job trigger configuration.

use crate::types::{JobName, RepoFullName};

/// How one monitored job reacts to pull request events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    pub job: JobName,

    /// Only events into this repository start builds (exact match).
    pub destination_repository: RepoFullName,

    /// Cancel queued and interrupt running builds of the same pull request
    /// before starting a new one.
    pub cancel_outdated_jobs: bool,
}

impl TriggerConfig {
    /// True if this job listens for pull requests into `repository`.
    pub fn listens_to(&self, repository: &RepoFullName) -> bool {
        self.destination_repository == *repository
    }
}
