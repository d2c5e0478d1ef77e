//! The normalized pull request event.

use serde::{Deserialize, Serialize};

use super::ids::{PullRequestId, RepoFullName, Sha};

/// Base URL of the Bitbucket web UI, used for human-readable links.
pub const BITBUCKET_WEB_URL: &str = "https://bitbucket.org/";

/// A pull request notification, decoded and validated at ingress.
///
/// Created once per inbound webhook and never mutated. `pull_request_id`
/// together with `source_repository` identifies "the same pull request" across
/// events; everything else (title, branches, hashes) may change between
/// updates of one pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub source_branch: String,
    pub destination_branch: String,
    pub source_repository: RepoFullName,
    pub source_commit: Sha,
    pub destination_repository: RepoFullName,
    pub destination_commit: Sha,
    pub pull_request_id: PullRequestId,
    pub title: String,
    pub author: String,
}

impl PullRequestEvent {
    /// `#<id> <title>`.
    pub fn short_description(&self) -> String {
        format!("#{} {}", self.pull_request_id.as_str(), self.title)
    }

    /// Description of a build started for this pull request, linking back
    /// to it.
    pub fn build_description(&self) -> String {
        format!("{} ({})", self.short_description(), self.web_url())
    }

    /// Link to the pull request page on the hosting service.
    pub fn web_url(&self) -> String {
        format!(
            "{}{}/pull-requests/{}",
            BITBUCKET_WEB_URL,
            self.destination_repository,
            self.pull_request_id.as_str()
        )
    }
}
